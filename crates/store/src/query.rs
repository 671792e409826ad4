use common::UserId;
use domain::{Listing, ListingStatus, Money};

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Default page size.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Sort order for listing queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingSort {
    #[default]
    Newest,
    Oldest,
    PriceAsc,
    PriceDesc,
}

/// Builder for constructing listing queries.
///
/// Defaults to Active listings, newest first, page 1 of 20.
#[derive(Debug, Clone)]
pub struct ListingQuery {
    /// Filter by status. `None` matches every status.
    pub status: Option<ListingStatus>,

    /// Filter by game.
    pub game_id: Option<i64>,

    /// Filter by seller.
    pub seller_id: Option<UserId>,

    /// Minimum price (inclusive).
    pub min_price: Option<Money>,

    /// Maximum price (inclusive).
    pub max_price: Option<Money>,

    /// Case-insensitive substring of the title.
    pub search: Option<String>,

    pub sort: ListingSort,

    /// 1-based page number.
    pub page: u32,

    /// Page size, within `1..=MAX_PAGE_SIZE`.
    pub limit: u32,
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            status: Some(ListingStatus::Active),
            game_id: None,
            seller_id: None,
            min_price: None,
            max_price: None,
            search: None,
            sort: ListingSort::default(),
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ListingQuery {
    /// Creates a query for Active listings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by status, or matches every status when `None`.
    pub fn status(mut self, status: Option<ListingStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn game_id(mut self, game_id: i64) -> Self {
        self.game_id = Some(game_id);
        self
    }

    pub fn seller_id(mut self, seller_id: UserId) -> Self {
        self.seller_id = Some(seller_id);
        self
    }

    pub fn min_price(mut self, price: Money) -> Self {
        self.min_price = Some(price);
        self
    }

    pub fn max_price(mut self, price: Money) -> Self {
        self.max_price = Some(price);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn sort(mut self, sort: ListingSort) -> Self {
        self.sort = sort;
        self
    }

    /// Selects a page; values below 1 are treated as 1.
    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Sets the page size, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Number of rows skipped before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// Returns true if `listing` satisfies every filter.
    pub fn matches(&self, listing: &Listing) -> bool {
        if let Some(status) = self.status
            && listing.status != status
        {
            return false;
        }
        if let Some(game_id) = self.game_id
            && listing.game_id != game_id
        {
            return false;
        }
        if let Some(seller_id) = self.seller_id
            && listing.seller_id != seller_id
        {
            return false;
        }
        if let Some(min) = self.min_price
            && listing.price < min
        {
            return false;
        }
        if let Some(max) = self.max_price
            && listing.price > max
        {
            return false;
        }
        if let Some(ref term) = self.search
            && !listing
                .title
                .to_lowercase()
                .contains(&term.to_lowercase())
        {
            return false;
        }
        true
    }
}

/// One page of listing query results.
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub listings: Vec<Listing>,
    pub page: u32,
    pub limit: u32,
    /// Number of listings matching the filters across all pages.
    pub total: u64,
}

impl ListingPage {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.limit.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_defaults_to_active_first_page() {
        let query = ListingQuery::new();

        assert_eq!(query.status, Some(ListingStatus::Active));
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(query.offset(), 0);
        assert_eq!(query.sort, ListingSort::Newest);
    }

    #[test]
    fn query_builder_chain() {
        let seller = UserId::new();
        let query = ListingQuery::new()
            .game_id(3)
            .seller_id(seller)
            .min_price(Money::from_units(1000))
            .max_price(Money::from_units(50000))
            .search("mythic")
            .sort(ListingSort::PriceAsc)
            .page(3)
            .limit(10);

        assert_eq!(query.game_id, Some(3));
        assert_eq!(query.seller_id, Some(seller));
        assert_eq!(query.min_price, Some(Money::from_units(1000)));
        assert_eq!(query.max_price, Some(Money::from_units(50000)));
        assert_eq!(query.search.as_deref(), Some("mythic"));
        assert_eq!(query.sort, ListingSort::PriceAsc);
        assert_eq!(query.offset(), 20);
    }

    #[test]
    fn page_and_limit_are_clamped() {
        let query = ListingQuery::new().page(0).limit(500);
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, MAX_PAGE_SIZE);

        let query = ListingQuery::new().limit(0);
        assert_eq!(query.limit, 1);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = ListingPage {
            listings: vec![],
            page: 1,
            limit: 20,
            total: 41,
        };
        assert_eq!(page.total_pages(), 3);

        let empty = ListingPage {
            listings: vec![],
            page: 1,
            limit: 20,
            total: 0,
        };
        assert_eq!(empty.total_pages(), 0);
    }
}
