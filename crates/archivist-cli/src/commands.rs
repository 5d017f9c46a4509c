//! Command handlers. Session commands reach the store through
//! `auth::current()`, so they must run inside `auth::scope`.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use tracing::warn;

use archivist_core::auth::{self, CredentialStore};
use archivist_core::{ArchiveClient, Config, ResourceClient, UploadFile};

// ===== Session =====

pub async fn login(config: &mut Config, identifier: Option<&str>) -> Result<()> {
    let identifier = match identifier {
        Some(id) => id.to_string(),
        None => prompt_identifier(config.last_identifier.as_deref())?,
    };
    if identifier.is_empty() {
        bail!("An identifier is required");
    }
    let password = rpassword::prompt_password("Password: ")?;

    let session = auth::current();
    let user = session.login(&identifier, &password).await?;

    config.last_identifier = Some(identifier);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Logged in as {}", user.display_name());
    Ok(())
}

pub async fn signup(args: &[String]) -> Result<()> {
    let (name, identifier) = match args {
        [name, identifier, ..] => (name.as_str(), identifier.as_str()),
        _ => bail!("Usage: archivist signup <name> <identifier> [avatar-url]"),
    };
    let avatar = args.get(2).map(String::as_str);

    let password = rpassword::prompt_password("Choose a password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    auth::current().signup(name, identifier, &password, avatar).await?;
    println!("Account created. Run `archivist login {}` to sign in.", identifier);
    Ok(())
}

pub fn logout() {
    auth::current().logout();
    println!("Logged out");
}

pub fn whoami() {
    match auth::current().user() {
        Some(user) => {
            println!("{} (id {})", user.display_name(), user.id);
            if let Some(ref role) = user.role {
                println!("role: {}", role);
            }
        }
        None => println!("Not logged in"),
    }
}

fn prompt_identifier(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => print!("Identifier [{}]: ", last),
        None => print!("Identifier: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();
    Ok(match (input.is_empty(), last) {
        (true, Some(last)) => last.to_string(),
        _ => input.to_string(),
    })
}

// ===== Records =====

pub async fn records(config: &Config, args: &[String]) -> Result<()> {
    let endpoint = config
        .resource_endpoint
        .as_deref()
        .context("No resource endpoint configured (set ARCHIVIST_RESOURCE_URL)")?;
    let client = ResourceClient::new(endpoint)?;

    match args {
        [cmd] if cmd == "list" => {
            let records = client.list().await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        [cmd, fields @ ..] if cmd == "create" => {
            client.create(&parse_fields(fields)?).await?;
            println!("Create request sent");
        }
        [cmd, id, fields @ ..] if cmd == "update" => {
            client.update(id, &parse_fields(fields)?).await?;
            println!("Update request sent for {}", id);
        }
        [cmd, id] if cmd == "delete" => {
            client.delete(id).await?;
            println!("Delete request sent for {}", id);
        }
        _ => bail!("Usage: archivist records list | create k=v... | update <id> k=v... | delete <id>"),
    }
    Ok(())
}

/// Parse `key=value` arguments into record fields
fn parse_fields(args: &[String]) -> Result<Map<String, Value>> {
    let mut fields = Map::new();
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .with_context(|| format!("Expected key=value, got {:?}", arg))?;
        if key.is_empty() {
            bail!("Empty field name in {:?}", arg);
        }
        fields.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(fields)
}

// ===== Archive =====

pub async fn upload(config: &Config, args: &[String]) -> Result<()> {
    let (path, container) = match args {
        [path, container, ..] => (path, container),
        _ => bail!("Usage: archivist upload <path> <container> [content-type]"),
    };
    let content_type = args.get(2).map(String::as_str);

    let client = ArchiveClient::new(config.archive.clone())?;
    let file = UploadFile::from_path(Path::new(path), content_type)?;
    eprintln!("Uploading {} as {} ({} bytes)", file.file_name, file.media_kind(), file.data.len());

    let receipt = client
        .upload(file, container, |pct| {
            eprint!("\r{:>3}%", pct);
            let _ = io::stderr().flush();
        })
        .await;
    eprintln!();

    let receipt = receipt?;
    println!("{}", receipt.url);
    Ok(())
}

pub fn set_secret() -> Result<()> {
    let secret = rpassword::prompt_password("Archive secret key: ")?;
    if secret.trim().is_empty() {
        bail!("Secret key cannot be empty");
    }
    CredentialStore::store_archive_secret(secret.trim())?;
    println!("Archive secret stored in keychain");
    Ok(())
}

pub fn clear_secret() -> Result<()> {
    CredentialStore::delete_archive_secret()?;
    println!("Archive secret removed from keychain");
    Ok(())
}
