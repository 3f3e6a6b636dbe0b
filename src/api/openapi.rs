use super::handlers::{auth, comments, health, notifications, posts, users};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated spec. Routes added outside (like `/` and
/// `/ws`) are intentionally not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::send_otp))
        .routes(routes!(auth::verify_otp))
        .routes(routes!(auth::login))
        .routes(routes!(auth::verify_login_otp))
        .routes(routes!(auth::me))
        .routes(routes!(users::get_profile))
        .routes(routes!(users::update_profile))
        .routes(routes!(users::toggle_follow))
        .routes(routes!(users::toggle_block))
        .routes(routes!(users::get_by_handle))
        .routes(routes!(users::search))
        .routes(routes!(posts::create))
        .routes(routes!(posts::feed))
        .routes(routes!(posts::detail))
        .routes(routes!(posts::toggle_like))
        .routes(routes!(posts::delete))
        .routes(routes!(posts::report))
        .routes(routes!(posts::by_author))
        .routes(routes!(comments::create))
        .routes(routes!(comments::list))
        .routes(routes!(comments::toggle_like))
        .routes(routes!(comments::reply))
        .routes(routes!(comments::delete))
        .routes(routes!(notifications::list))
        .routes(routes!(notifications::unread_count))
        .routes(routes!(notifications::mark_read))
        .routes(routes!(notifications::mark_all_read))
        .routes(routes!(notifications::delete));

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Enrollment, login, and token echo".to_string());

    let mut users_tag = Tag::new("users");
    users_tag.description = Some("Profiles and the follow/block graph".to_string());

    let mut posts_tag = Tag::new("posts");
    posts_tag.description = Some("Posts, likes, and reports".to_string());

    let mut comments_tag = Tag::new("comments");
    comments_tag.description = Some("Comment threads and replies".to_string());

    let mut notifications_tag = Tag::new("notifications");
    notifications_tag.description = Some("Per-account notification inbox".to_string());

    router.get_openapi_mut().tags = Some(vec![
        auth_tag,
        users_tag,
        posts_tag,
        comments_tag,
        notifications_tag,
    ]);

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
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

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Flustri"));
            assert_eq!(contact.email.as_deref(), Some("team@flustri.dev"));
        }
    }

    #[test]
    fn openapi_tags_and_paths() {
        let spec = openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "auth"));
        assert!(tags.iter().any(|tag| tag.name == "notifications"));
        assert!(spec.paths.paths.contains_key("/auth/send-otp"));
        assert!(spec.paths.paths.contains_key("/auth/verify-login-otp"));
        assert!(spec.paths.paths.contains_key("/posts/{id}/like"));
        assert!(spec.paths.paths.contains_key("/users/name/{handle}"));
    }
}
