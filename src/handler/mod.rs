//! HTTP request handlers
//!
//! Handlers stay thin: they extract the caller and the request, check access,
//! and delegate to the components in [`AppState`](crate::database::AppState).
//! Every failure is an [`AppError`](crate::error::AppError) response.

pub mod account;
pub mod admin;
pub mod cards;
pub mod links;

use crate::config::Config;
use crate::model::{LinkResponse, PublicLink};

pub(crate) fn with_url(config: &Config, link: PublicLink) -> LinkResponse {
    LinkResponse {
        url: config.card_url(&link.unique_slug),
        link,
    }
}
