use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An authenticated account as returned by the auth backend.
///
/// Only the identifier is required. Fields this crate does not model are kept
/// in `extra` so that persisting and restoring a user is lossless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "_id", deserialize_with = "crate::models::id::deserialize_required")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// Create a user with only an identifier set
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            email: None,
            role: None,
            avatar: None,
            extra: Map::new(),
        }
    }

    /// Name for display, falling back to the email and then the id
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_numeric_id_is_normalized() {
        let user: User = serde_json::from_str(r#"{"id": 17, "name": "Ada"}"#)
            .expect("Failed to parse user JSON");
        assert_eq!(user.id, "17");
        assert_eq!(user.name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_user_underscore_id_alias() {
        let user: User = serde_json::from_str(r#"{"_id": "64f0c2", "email": "a@b.c"}"#)
            .expect("Failed to parse user JSON");
        assert_eq!(user.id, "64f0c2");
    }

    #[test]
    fn test_user_keeps_unknown_fields() {
        let json = r#"{"id":"u1","email":"a@b.c","token":"t0k","createdAt":"2024-01-01"}"#;
        let user: User = serde_json::from_str(json).expect("Failed to parse user JSON");
        assert_eq!(user.extra.get("token").and_then(Value::as_str), Some("t0k"));

        let encoded = serde_json::to_string(&user).expect("Failed to encode user");
        let decoded: User = serde_json::from_str(&encoded).expect("Failed to decode user");
        assert_eq!(decoded, user);
    }

    #[test]
    fn test_user_without_id_is_rejected() {
        assert!(serde_json::from_str::<User>(r#"{"name": "Ada"}"#).is_err());
    }

    #[test]
    fn test_user_with_null_or_empty_id_is_rejected() {
        assert!(serde_json::from_str::<User>(r#"{"id": null, "name": "x"}"#).is_err());
        assert!(serde_json::from_str::<User>(r#"{"id": "", "name": "x"}"#).is_err());
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut user = User::new("u1");
        assert_eq!(user.display_name(), "u1");
        user.email = Some("ada@example.com".to_string());
        assert_eq!(user.display_name(), "ada@example.com");
        user.name = Some("Ada".to_string());
        assert_eq!(user.display_name(), "Ada");
    }
}
