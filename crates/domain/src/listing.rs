//! Game-account listings and their availability state machine.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{ListingId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::Money;

/// Availability of a listing.
///
/// State transitions during a purchase attempt:
/// ```text
/// Active ──reserve──► Reserved ──gateway ok──► Sold
///   ▲                    │                      │
///   └──────release───────┴──────────────────────┘
/// ```
/// `Removed` is reached only through seller or administrative action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// Open for purchase.
    #[default]
    Active,

    /// Claimed by exactly one in-flight purchase attempt.
    Reserved,

    /// Invoice issued to a buyer.
    Sold,

    /// Withdrawn from the marketplace.
    Removed,
}

impl ListingStatus {
    /// Returns true if a purchase attempt may reserve the listing.
    pub fn can_reserve(&self) -> bool {
        matches!(self, ListingStatus::Active)
    }

    /// Returns true if the listing may be marked sold.
    pub fn can_mark_sold(&self) -> bool {
        matches!(self, ListingStatus::Reserved)
    }

    /// Returns true if the listing may be released back to Active.
    pub fn can_release(&self) -> bool {
        matches!(self, ListingStatus::Reserved | ListingStatus::Sold)
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Reserved => "reserved",
            ListingStatus::Sold => "sold",
            ListingStatus::Removed => "removed",
        }
    }
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ListingStatus::Active),
            "reserved" => Ok(ListingStatus::Reserved),
            "sold" => Ok(ListingStatus::Sold),
            "removed" => Ok(ListingStatus::Removed),
            other => Err(DomainError::UnknownStatus {
                kind: "listing",
                value: other.to_string(),
            }),
        }
    }
}

/// How the buyer will sign in to the purchased game account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginMethod {
    Moonton,
    Google,
    Facebook,
    Vk,
    Apple,
    Email,
}

impl LoginMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginMethod::Moonton => "moonton",
            LoginMethod::Google => "google",
            LoginMethod::Facebook => "facebook",
            LoginMethod::Vk => "vk",
            LoginMethod::Apple => "apple",
            LoginMethod::Email => "email",
        }
    }
}

impl FromStr for LoginMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "moonton" => Ok(LoginMethod::Moonton),
            "google" => Ok(LoginMethod::Google),
            "facebook" => Ok(LoginMethod::Facebook),
            "vk" => Ok(LoginMethod::Vk),
            "apple" => Ok(LoginMethod::Apple),
            "email" => Ok(LoginMethod::Email),
            other => Err(DomainError::UnknownLoginMethod(other.to_string())),
        }
    }
}

/// Seller-supplied fields for a new listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingDraft {
    pub game_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub price: Money,
    pub login_method: LoginMethod,
    /// Game-specific attributes (rank, level, skins, ...).
    pub details: serde_json::Value,
    pub images: Vec<String>,
}

/// A game account offered for sale.
///
/// `id`, `seller_id` and `price` never change after creation; `status` is the
/// single mutable availability field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub seller_id: UserId,
    pub game_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub price: Money,
    pub login_method: LoginMethod,
    pub details: serde_json::Value,
    pub images: Vec<String>,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// Creates an Active listing owned by `seller_id`.
    pub fn new(seller_id: UserId, draft: ListingDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: ListingId::new(),
            seller_id,
            game_id: draft.game_id,
            title: draft.title,
            description: draft.description,
            price: draft.price,
            login_method: draft.login_method,
            details: draft.details,
            images: draft.images,
            status: ListingStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if `user_id` owns this listing.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.seller_id == user_id
    }
}
