use crate::api::handlers::{health, session};
use crate::auth::types::SessionResponse;
use axum::response::Json;
use utoipa::openapi::{Contact, License, Tag};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(health::health, session::session),
    components(schemas(health::Health, SessionResponse))
)]
struct ApiDoc;

/// The generated `OpenAPI` document with Cargo.toml metadata applied.
///
/// Routes added outside the annotated set (like `/` and the auth
/// passthrough) are intentionally not documented.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut api = ApiDoc::openapi();

    // Use Cargo.toml metadata instead of the derive defaults.
    api.info.title = env!("CARGO_PKG_NAME").to_string();
    api.info.version = env!("CARGO_PKG_VERSION").to_string();
    api.info.description = optional_str(env!("CARGO_PKG_DESCRIPTION")).map(str::to_string);
    api.info.contact = cargo_contact();
    api.info.license = cargo_license();

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Service and backend health".to_string());
    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Session resolution".to_string());
    api.tags = Some(vec![health_tag, auth_tag]);

    api
}

/// axum handler serving the document as JSON.
pub async fn serve() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi())
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
        assert!(spec.info.contact.is_some());
    }

    #[test]
    fn author_parsing_handles_both_shapes() {
        assert_eq!(
            parse_author("Team Gardi <team@gardi.dev>"),
            (Some("Team Gardi"), Some("team@gardi.dev"))
        );
        assert_eq!(parse_author("Team Gardi"), (Some("Team Gardi"), None));
    }
}
