//! Listing creation and browsing endpoints.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{ListingId, UserId};
use domain::{Listing, ListingDraft, ListingStatus, LoginMethod, Money};
use serde::{Deserialize, Serialize};
use store::{DEFAULT_PAGE_SIZE, ListingPage, ListingQuery, ListingSort, ListingStore, MAX_PAGE_SIZE};

use super::Envelope;
use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

const TITLE_LEN: std::ops::RangeInclusive<usize> = 10..=255;
const MAX_DESCRIPTION_LEN: usize = 5000;
const MIN_PRICE_UNITS: i64 = 1000;
const MAX_PRICE_UNITS: i64 = 1_000_000_000_000;
const MAX_IMAGES: usize = 10;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateListingRequest {
    pub game_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub price: Money,
    pub login_method: String,
    #[serde(default = "empty_details")]
    pub details: serde_json::Value,
    pub images: Vec<String>,
}

fn empty_details() -> serde_json::Value {
    serde_json::json!({})
}

impl CreateListingRequest {
    /// Checks the seller-supplied fields and builds a draft.
    pub fn validate(self) -> Result<ListingDraft, ApiError> {
        if self.game_id < 1 {
            return Err(ApiError::BadRequest("game_id must be positive".to_string()));
        }

        let title = self.title.trim().to_string();
        if !TITLE_LEN.contains(&title.chars().count()) {
            return Err(ApiError::BadRequest(format!(
                "title must be between {} and {} characters",
                TITLE_LEN.start(),
                TITLE_LEN.end()
            )));
        }

        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        if description
            .as_ref()
            .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN)
        {
            return Err(ApiError::BadRequest(format!(
                "description must be at most {MAX_DESCRIPTION_LEN} characters"
            )));
        }

        if self.price < Money::from_units(MIN_PRICE_UNITS) {
            return Err(ApiError::BadRequest(format!(
                "price must be at least {MIN_PRICE_UNITS}"
            )));
        }
        if self.price > Money::from_units(MAX_PRICE_UNITS) {
            return Err(ApiError::BadRequest(format!(
                "price must be at most {MAX_PRICE_UNITS}"
            )));
        }

        let login_method: LoginMethod = self
            .login_method
            .parse()
            .map_err(|e: domain::DomainError| ApiError::BadRequest(e.to_string()))?;

        if !self.details.is_object() {
            return Err(ApiError::BadRequest("details must be an object".to_string()));
        }

        if self.images.is_empty() || self.images.len() > MAX_IMAGES {
            return Err(ApiError::BadRequest(format!(
                "between 1 and {MAX_IMAGES} images are required"
            )));
        }
        if let Some(bad) = self
            .images
            .iter()
            .find(|url| !(url.starts_with("https://") || url.starts_with("http://")))
        {
            return Err(ApiError::BadRequest(format!("invalid image URL: {bad}")));
        }

        Ok(ListingDraft {
            game_id: self.game_id,
            title,
            description,
            price: self.price,
            login_method,
            details: self.details,
            images: self.images,
        })
    }
}

/// Query string for `GET /listings`.
#[derive(Debug, Default, Deserialize)]
pub struct ListListingsParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub game_id: Option<i64>,
    pub seller_id: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub sort: Option<String>,
    pub search: Option<String>,
}

impl ListListingsParams {
    /// Builds a store query over Active listings.
    pub fn into_query(self) -> Result<ListingQuery, ApiError> {
        let mut query = ListingQuery::new().status(Some(ListingStatus::Active));

        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(ApiError::BadRequest("page must be at least 1".to_string()));
        }
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(ApiError::BadRequest(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        query = query.page(page).limit(limit);

        if let Some(game_id) = self.game_id {
            query = query.game_id(game_id);
        }
        if let Some(ref seller) = self.seller_id {
            let seller = UserId::parse_str(seller)
                .map_err(|e| ApiError::BadRequest(format!("Invalid seller_id: {e}")))?;
            query = query.seller_id(seller);
        }
        if let Some(ref min) = self.min_price {
            query = query.min_price(parse_price("min_price", min)?);
        }
        if let Some(ref max) = self.max_price {
            query = query.max_price(parse_price("max_price", max)?);
        }
        if let Some(sort) = self.sort.as_deref() {
            query = query.sort(parse_sort(sort)?);
        }
        if let Some(term) = self.search.map(|s| s.trim().to_string())
            && !term.is_empty()
        {
            query = query.search(term);
        }

        Ok(query)
    }
}

fn parse_price(field: &str, raw: &str) -> Result<Money, ApiError> {
    raw.trim()
        .parse::<Money>()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {field}: {raw}")))
}

fn parse_sort(raw: &str) -> Result<ListingSort, ApiError> {
    match raw {
        "newest" => Ok(ListingSort::Newest),
        "oldest" => Ok(ListingSort::Oldest),
        "price_asc" => Ok(ListingSort::PriceAsc),
        "price_desc" => Ok(ListingSort::PriceDesc),
        other => Err(ApiError::BadRequest(format!(
            "Invalid sort: {other} (expected newest, oldest, price_asc or price_desc)"
        ))),
    }
}

pub(crate) fn parse_listing_id(raw: &str) -> Result<ListingId, ApiError> {
    ListingId::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("Invalid listing id: {e}")))
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct ListingResponse {
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

impl From<Listing> for ListingResponse {
    fn from(listing: Listing) -> Self {
        Self {
            id: listing.id,
            seller_id: listing.seller_id,
            game_id: listing.game_id,
            title: listing.title,
            description: listing.description,
            price: listing.price,
            login_method: listing.login_method,
            details: listing.details,
            images: listing.images,
            status: listing.status,
            created_at: listing.created_at,
            updated_at: listing.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct ListingPageResponse {
    pub listings: Vec<ListingResponse>,
    pub pagination: Pagination,
}

impl From<ListingPage> for ListingPageResponse {
    fn from(page: ListingPage) -> Self {
        let pagination = Pagination {
            page: page.page,
            limit: page.limit,
            total: page.total,
            total_pages: page.total_pages(),
        };
        Self {
            listings: page.listings.into_iter().map(Into::into).collect(),
            pagination,
        }
    }
}

// -- Handlers --

/// POST /listings: verified sellers put an account up for sale.
#[tracing::instrument(skip(state, user, payload), fields(seller_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<CreateListingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<ListingResponse>>), ApiError> {
    if !user.is_verified_seller() {
        return Err(ApiError::Forbidden(
            "Only verified sellers can create listings".to_string(),
        ));
    }

    let Json(req) = payload?;
    let draft = req.validate()?;
    let listing = Listing::new(user.id, draft, Utc::now());
    state.listings.insert(listing.clone()).await?;

    metrics::counter!("listings_created_total").increment(1);
    tracing::info!(listing_id = %listing.id, price = %listing.price, "listing created");

    Ok((StatusCode::CREATED, Json(Envelope::ok(listing.into()))))
}

/// GET /listings: one page of Active listings.
#[tracing::instrument(skip(state, params))]
pub async fn list(
    State(state): State<AppState>,
    params: Result<Query<ListListingsParams>, QueryRejection>,
) -> Result<Json<Envelope<ListingPageResponse>>, ApiError> {
    let Query(params) = params?;
    let query = params.into_query()?;
    let page = state.listings.list(query).await?;
    Ok(Json(Envelope::ok(page.into())))
}

/// GET /listings/{id}
#[tracing::instrument(skip(state, id))]
pub async fn get(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<Envelope<ListingResponse>>, ApiError> {
    let Path(id) = id?;
    let listing_id = parse_listing_id(&id)?;
    let listing = state
        .listings
        .get_by_id(listing_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Listing {id} not found")))?;
    Ok(Json(Envelope::ok(listing.into())))
}
