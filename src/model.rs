//! Data models for the card platform
//!
//! Records stored in the database (users, business cards, public links) and
//! the request/response bodies of the HTTP API. All JSON is camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;

/// Longest bio accepted on a card
pub const MAX_BIO_LEN: usize = 200;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// A registered account
///
/// The password hash is stored with the record but never leaves the server;
/// API responses use [`UserResponse`].
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// The authenticated caller of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: u64,
    pub username: String,
    pub role: Role,
}

impl UserIdentity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fails with `Forbidden` unless the identity holds `role`
    ///
    /// Admins satisfy every role.
    pub fn require_role(&self, role: Role) -> Result<(), AppError> {
        if self.role == role || self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

impl From<&User> for UserIdentity {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
        }
    }
}

/// Server-side session record, keyed by its token
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocialPlatform {
    LinkedIn,
    Twitter,
    Instagram,
    Facebook,
    GitHub,
    YouTube,
    TikTok,
    Pinterest,
    Reddit,
    Snapchat,
    Other,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SocialMedia {
    pub platform: SocialPlatform,
    pub url: String,
}

/// Visual theme a card is rendered with
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Template {
    #[default]
    Classic,
    Modern,
    Vibrant,
    Fresh,
    Minimal,
}

/// The presentable part of a business card
///
/// Everything here is copied when a card is instantiated from a template;
/// identity and ownership live on [`BusinessCard`] itself.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CardFields {
    pub first_name: String,
    pub last_name: String,
    pub job_title: String,
    pub company: String,
    pub email: String,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub bio: Option<String>,
    pub profile_image: Option<String>,
    pub social_media: Vec<SocialMedia>,
    pub template: Template,
}

impl CardFields {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_bio(self.bio.as_deref())?;
        validate_url("website", self.website.as_deref())?;
        validate_social(&self.social_media)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BusinessCard {
    pub id: u64,
    /// Owning account; absent for anonymous device-only cards
    pub user_id: Option<u64>,
    /// Client-generated token that lets an anonymous device edit its card
    pub device_id: Option<String>,
    #[serde(default)]
    pub is_template: bool,
    #[serde(flatten)]
    pub fields: CardFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a card record
#[derive(Debug, Clone, Default)]
pub struct NewCard {
    pub user_id: Option<u64>,
    pub device_id: Option<String>,
    pub is_template: bool,
    pub fields: CardFields,
}

/// Partial update of a card's presentable fields
///
/// `None` leaves a field untouched. For optional fields an empty string
/// clears the stored value.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CardPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub bio: Option<String>,
    pub profile_image: Option<String>,
    pub social_media: Option<Vec<SocialMedia>>,
    pub template: Option<Template>,
}

impl CardPatch {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_bio(self.bio.as_deref())?;
        validate_url("website", self.website.as_deref().filter(|w| !w.is_empty()))?;
        if let Some(social) = &self.social_media {
            validate_social(social)?;
        }
        Ok(())
    }

    pub fn apply(self, fields: &mut CardFields) {
        fn set(target: &mut String, value: Option<String>) {
            if let Some(value) = value {
                *target = value;
            }
        }
        fn set_optional(target: &mut Option<String>, value: Option<String>) {
            if let Some(value) = value {
                *target = Some(value).filter(|v| !v.is_empty());
            }
        }

        set(&mut fields.first_name, self.first_name);
        set(&mut fields.last_name, self.last_name);
        set(&mut fields.job_title, self.job_title);
        set(&mut fields.company, self.company);
        set(&mut fields.email, self.email);
        set_optional(&mut fields.phone, self.phone);
        set_optional(&mut fields.website, self.website);
        set_optional(&mut fields.bio, self.bio);
        set_optional(&mut fields.profile_image, self.profile_image);
        if let Some(social) = self.social_media {
            fields.social_media = social;
        }
        if let Some(template) = self.template {
            fields.template = template;
        }
    }
}

fn validate_bio(bio: Option<&str>) -> Result<(), AppError> {
    match bio {
        Some(bio) if bio.chars().count() > MAX_BIO_LEN => Err(AppError::invalid(format!(
            "Bio must be under {} characters",
            MAX_BIO_LEN
        ))),
        _ => Ok(()),
    }
}

fn validate_url(field: &str, value: Option<&str>) -> Result<(), AppError> {
    let Some(value) = value else {
        return Ok(());
    };
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(AppError::invalid(format!("Invalid {} URL: {}", field, value))),
    }
}

fn validate_social(social: &[SocialMedia]) -> Result<(), AppError> {
    social
        .iter()
        .try_for_each(|entry| validate_url("social media", Some(entry.url.as_str())))
}

/// A slug-addressed public link to a card
///
/// Pre-generated links start unbound (`business_card_id` is `None`) and are
/// bound exactly once by a claim. Ad hoc links are bound at creation.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PublicLink {
    pub id: u64,
    pub unique_slug: String,
    pub business_card_id: Option<u64>,
    pub is_active: bool,
    pub is_pre_generated: bool,
    pub is_claimed: bool,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by_user_id: Option<u64>,
    pub template_id: Option<u64>,
    #[serde(default)]
    pub view_count: u64,
    pub created_at: DateTime<Utc>,
}

impl PublicLink {
    /// Pre-generated, still waiting for a claimant, and visible
    pub fn is_unassigned(&self) -> bool {
        self.is_pre_generated && !self.is_claimed && self.is_active
    }
}

/// Card as shown to anonymous visitors: no owner or device identifiers
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PublicCard {
    pub id: u64,
    #[serde(flatten)]
    pub fields: CardFields,
}

impl From<BusinessCard> for PublicCard {
    fn from(card: BusinessCard) -> Self {
        Self {
            id: card.id,
            fields: card.fields,
        }
    }
}

/// What a prospective claimant sees before claiming a link
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatus {
    pub unique_slug: String,
    pub is_active: bool,
    pub is_pre_generated: bool,
    pub is_claimed: bool,
    pub template_card: Option<PublicCard>,
}

// ---- Request / response bodies ----

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub role: Role,
}

/// Query string of `GET /api/business-cards`
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardQuery {
    pub user_id: Option<u64>,
    pub device_id: Option<String>,
}

/// Device proof for managing an anonymous card
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeviceParams {
    pub device_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCardRequest {
    pub device_id: Option<String>,
    #[serde(flatten)]
    pub fields: CardFields,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSaveRequest {
    pub device_id: Option<String>,
    #[serde(flatten)]
    pub patch: CardPatch,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkRequest {
    pub business_card_id: u64,
    pub unique_slug: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateLinksRequest {
    pub count: i64,
    pub prefix: Option<String>,
    pub template_id: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleLinkRequest {
    pub is_active: bool,
}

/// A link together with its shareable address
#[derive(Serialize, Debug)]
pub struct LinkResponse {
    #[serde(flatten)]
    pub link: PublicLink,
    pub url: String,
}

#[derive(Serialize, Debug)]
pub struct GenerateLinksResponse {
    pub slugs: Vec<String>,
    pub links: Vec<LinkResponse>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub business_card_id: u64,
    pub link: PublicLink,
    pub card: BusinessCard,
}
