//! Order listing: filters, sorting and pagination.

use core::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use bazaar_core::{DomainError, DomainResult, UserId};

use crate::order::Order;
use crate::status::OrderStatus;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Which end of a date range an input describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBound {
    Start,
    End,
}

impl DateBound {
    /// Parse an RFC 3339 timestamp or a plain `YYYY-MM-DD` date.
    ///
    /// Plain dates expand to the first (start) or last (end) instant of that
    /// UTC day so both bounds are inclusive.
    pub fn parse(self, input: &str) -> DomainResult<DateTime<Utc>> {
        let input = input.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
            return Ok(ts.with_timezone(&Utc));
        }

        let date = NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| {
            DomainError::validation(format!("invalid date '{input}', expected YYYY-MM-DD or RFC 3339"))
        })?;
        let time = match self {
            DateBound::Start => NaiveTime::MIN,
            DateBound::End => NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
                .ok_or_else(|| DomainError::invariant("end of day out of range"))?,
        };
        Ok(date.and_time(time).and_utc())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        if self.user_id.is_some() && order.user_id != self.user_id {
            return false;
        }
        if let Some(status) = self.status {
            if order.status != status {
                return false;
            }
        }
        if let Some(start) = self.start_date {
            if order.created_at < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if order.created_at > end {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    CreatedAt,
    UpdatedAt,
    TotalAmount,
    Status,
}

impl SortBy {
    pub fn parse(input: &str) -> DomainResult<Self> {
        match input.trim() {
            "createdAt" => Ok(SortBy::CreatedAt),
            "updatedAt" => Ok(SortBy::UpdatedAt),
            "totalAmount" => Ok(SortBy::TotalAmount),
            "status" => Ok(SortBy::Status),
            other => Err(DomainError::validation(format!(
                "unsupported sortBy '{other}' (expected createdAt, updatedAt, totalAmount or status)"
            ))),
        }
    }

    /// Column name in the `orders` table. Never derived from client input.
    pub fn column(self) -> &'static str {
        match self {
            SortBy::CreatedAt => "created_at",
            SortBy::UpdatedAt => "updated_at",
            SortBy::TotalAmount => "total_amount",
            SortBy::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(input: &str) -> DomainResult<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(DomainError::validation(format!(
                "unsupported sortOrder '{other}' (expected asc or desc)"
            ))),
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderSort {
    pub by: SortBy,
    pub order: SortOrder,
}

impl OrderSort {
    /// Ordering between two orders; ties are broken by id so pages are stable.
    pub fn compare(&self, a: &Order, b: &Order) -> Ordering {
        let primary = match self.by {
            SortBy::CreatedAt => a.created_at.cmp(&b.created_at),
            SortBy::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortBy::TotalAmount => a.total_amount.cmp(&b.total_amount),
            SortBy::Status => a.status.as_str().cmp(b.status.as_str()),
        }
        .then_with(|| a.id.cmp(&b.id));

        match self.order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        }
    }
}

/// 1-based page request with a capped page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page,
            limit: request.limit,
            total_pages: total.div_ceil(u64::from(request.limit)),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        }
    }
}

/// Everything a listing needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    pub filter: OrderFilter,
    pub sort: OrderSort,
    pub page: PageRequest,
}

impl OrderQuery {
    /// Filter, sort and slice an in-memory collection of orders.
    pub fn apply<I>(&self, orders: I) -> Page<Order>
    where
        I: IntoIterator<Item = Order>,
    {
        let mut matching: Vec<Order> = orders
            .into_iter()
            .filter(|o| self.filter.matches(o))
            .collect();
        matching.sort_by(|a, b| self.sort.compare(a, b));

        let total = matching.len() as u64;
        let offset = usize::try_from(self.page.offset()).unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(self.page.limit as usize)
            .collect();
        Page::new(items, total, self.page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::{Money, OrderId};
    use chrono::{Duration, TimeZone};

    fn order_at(day: u32, total: i64, status: OrderStatus) -> Order {
        let at = Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap();
        Order {
            id: OrderId::new(),
            user_id: None,
            recipient_name: "A".to_string(),
            recipient_phone: "1".to_string(),
            recipient_address: "X".to_string(),
            notes: None,
            status,
            total_amount: Money::new(total),
            created_at: at,
            updated_at: at + Duration::hours(i64::from(day)),
        }
    }

    #[test]
    fn page_request_defaults_and_caps() {
        assert_eq!(PageRequest::new(None, None), PageRequest { page: 1, limit: 10 });
        assert_eq!(PageRequest::new(Some(0), Some(500)), PageRequest { page: 1, limit: 100 });
        assert_eq!(PageRequest::new(Some(3), Some(20)).offset(), 40);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page: Page<()> = Page::new(vec![], 21, PageRequest::new(None, Some(10)));
        assert_eq!(page.total_pages, 3);
        let empty: Page<()> = Page::new(vec![], 0, PageRequest::default());
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn date_bounds_cover_whole_days() {
        let start = DateBound::Start.parse("2024-03-02").unwrap();
        let end = DateBound::End.parse("2024-03-02").unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
        assert!(end > Utc.with_ymd_and_hms(2024, 3, 2, 23, 59, 59).unwrap());

        let ts = DateBound::End.parse("2024-03-02T10:00:00+02:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap());

        assert!(matches!(
            DateBound::Start.parse("yesterday"),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn sort_keys_parse_strictly() {
        assert_eq!(SortBy::parse("totalAmount").unwrap(), SortBy::TotalAmount);
        assert!(SortBy::parse("total_amount; drop table orders").is_err());
        assert_eq!(SortOrder::parse("ASC").unwrap(), SortOrder::Asc);
        assert!(SortOrder::parse("sideways").is_err());
    }

    #[test]
    fn apply_filters_sorts_and_paginates() {
        let orders = vec![
            order_at(1, 300, OrderStatus::Pending),
            order_at(2, 100, OrderStatus::Delivered),
            order_at(3, 200, OrderStatus::Pending),
            order_at(4, 400, OrderStatus::Pending),
        ];

        let query = OrderQuery {
            filter: OrderFilter {
                status: Some(OrderStatus::Pending),
                start_date: Some(DateBound::Start.parse("2024-03-01").unwrap()),
                end_date: Some(DateBound::End.parse("2024-03-03").unwrap()),
                ..OrderFilter::default()
            },
            sort: OrderSort {
                by: SortBy::TotalAmount,
                order: SortOrder::Asc,
            },
            page: PageRequest::new(Some(1), Some(1)),
        };

        let page = query.apply(orders.clone());
        assert_eq!(page.total, 2);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].total_amount, Money::new(200));

        let newest_first = OrderQuery::default().apply(orders);
        let days: Vec<u32> = newest_first
            .items
            .iter()
            .map(|o| chrono::Datelike::day(&o.created_at))
            .collect();
        assert_eq!(days, vec![4, 3, 2, 1]);
    }

    #[test]
    fn user_filter_excludes_guest_orders() {
        let user = UserId::new();
        let mut mine = order_at(1, 1, OrderStatus::Pending);
        mine.user_id = Some(user);
        let guest = order_at(2, 1, OrderStatus::Pending);

        let filter = OrderFilter {
            user_id: Some(user),
            ..OrderFilter::default()
        };
        assert!(filter.matches(&mine));
        assert!(!filter.matches(&guest));
    }
}
