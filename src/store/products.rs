use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Record, RecordStore};
use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub price: f64,
    pub category: String,
    pub stock: u64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for Product {
    fn id(&self) -> u64 {
        self.id
    }

    fn unique_key(&self) -> String {
        self.name.to_lowercase()
    }
}

/// `POST /api/products` body.
#[derive(Debug, Default, Deserialize)]
pub struct NewProduct {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub stock: Option<i64>,
}

#[derive(Debug)]
pub struct ValidProduct {
    pub name: String,
    pub price: f64,
    pub category: String,
    pub stock: u64,
}

impl NewProduct {
    pub fn validate(self) -> Result<ValidProduct, ApiError> {
        let name = required(self.name, "name")?;
        let price = self
            .price
            .ok_or_else(|| ApiError::validation("missing required field: price"))?;
        let category = required(self.category, "category")?;
        check_price(price)?;
        let stock = match self.stock {
            Some(stock) => check_stock(stock)?,
            None => 0,
        };
        Ok(ValidProduct {
            name,
            price,
            category,
            stock,
        })
    }
}

/// Partial update. `id` is only read by the bulk endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ProductPatch {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub stock: Option<i64>,
}

impl ProductPatch {
    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(price) = self.price {
            check_price(price)?;
        }
        if let Some(stock) = self.stock {
            check_stock(stock)?;
        }
        Ok(())
    }

    /// Call `validate` first; invalid numbers are skipped here.
    pub fn apply(&self, product: &mut Product) {
        if let Some(name) = non_blank(&self.name) {
            product.name = name;
        }
        if let Some(category) = non_blank(&self.category) {
            product.category = category;
        }
        if let Some(price) = self.price.filter(|p| p.is_finite() && *p > 0.0) {
            product.price = price;
        }
        if let Some(stock) = self.stock.filter(|s| *s >= 0) {
            product.stock = stock as u64;
        }
        product.updated_at = Some(Utc::now());
    }
}

/// `GET /api/products` query filters.
#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    #[serde(rename = "minPrice")]
    pub min_price: Option<String>,
    #[serde(rename = "maxPrice")]
    pub max_price: Option<String>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(category) = non_blank(&self.category) {
            if !product
                .category
                .to_lowercase()
                .contains(&category.to_lowercase())
            {
                return false;
            }
        }
        if let Some(search) = non_blank(&self.search) {
            if !product.name.to_lowercase().contains(&search.to_lowercase()) {
                return false;
            }
        }
        if let Some(min) = parse_price(&self.min_price) {
            if product.price < min {
                return false;
            }
        }
        if let Some(max) = parse_price(&self.max_price) {
            if product.price > max {
                return false;
            }
        }
        true
    }
}

fn parse_price(value: &Option<String>) -> Option<f64> {
    value.as_deref().and_then(|v| v.trim().parse().ok())
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    non_blank(&value).ok_or_else(|| ApiError::validation(format!("missing required field: {field}")))
}

fn check_price(price: f64) -> Result<(), ApiError> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(ApiError::validation("price must be a number greater than 0"))
    }
}

fn check_stock(stock: i64) -> Result<u64, ApiError> {
    u64::try_from(stock).map_err(|_| ApiError::validation("stock must not be negative"))
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn build_product(id: u64, valid: ValidProduct) -> Product {
    Product {
        id,
        name: valid.name,
        price: valid.price,
        category: valid.category,
        stock: valid.stock,
        created_at: Utc::now(),
        updated_at: None,
    }
}

/// Demo catalogue present at startup.
pub fn seeded() -> RecordStore<Product> {
    let catalogue = [
        ("iPhone 15", 999.0, "手机", 10),
        ("MacBook Pro", 1999.0, "笔记本", 5),
        ("AirPods Pro", 249.0, "耳机", 20),
        ("iPad Air", 599.0, "平板", 8),
        ("Apple Watch", 399.0, "手表", 15),
    ];
    let records = catalogue
        .into_iter()
        .enumerate()
        .map(|(i, (name, price, category, stock))| {
            build_product(
                i as u64 + 1,
                ValidProduct {
                    name: name.to_string(),
                    price,
                    category: category.to_string(),
                    stock,
                },
            )
        })
        .collect();
    RecordStore::with_records(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Pagination;

    #[test]
    fn price_range_is_inclusive() {
        let store = seeded();
        let filter = ProductFilter {
            min_price: Some("399".into()),
            max_price: Some("999".into()),
            ..Default::default()
        };
        let (items, total) = store.list(|p| filter.matches(p), Pagination::default());
        assert_eq!(total, 3);
        let names: Vec<_> = items.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["iPhone 15", "iPad Air", "Apple Watch"]);
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let store = seeded();
        let filter = ProductFilter {
            search: Some("pro".into()),
            ..Default::default()
        };
        let (_, total) = store.list(|p| filter.matches(p), Pagination::default());
        assert_eq!(total, 2);
    }

    #[test]
    fn garbage_price_bounds_are_ignored() {
        let store = seeded();
        let filter = ProductFilter {
            min_price: Some("cheap".into()),
            ..Default::default()
        };
        let (_, total) = store.list(|p| filter.matches(p), Pagination::default());
        assert_eq!(total, 5);
    }

    #[test]
    fn new_product_validation() {
        let missing = NewProduct {
            name: Some("Pencil".into()),
            ..Default::default()
        };
        assert_eq!(missing.validate().unwrap_err().code(), "VALIDATION_ERROR");

        let free = NewProduct {
            name: Some("Pencil".into()),
            price: Some(0.0),
            category: Some("stationery".into()),
            stock: None,
        };
        assert!(free.validate().is_err());

        let negative_stock = NewProduct {
            name: Some("Pencil".into()),
            price: Some(1.5),
            category: Some("stationery".into()),
            stock: Some(-1),
        };
        assert!(negative_stock.validate().is_err());

        let ok = NewProduct {
            name: Some("Pencil".into()),
            price: Some(1.5),
            category: Some("stationery".into()),
            stock: None,
        }
        .validate()
        .unwrap();
        assert_eq!(ok.stock, 0);
    }

    #[test]
    fn new_ids_follow_the_catalogue() {
        let mut store = seeded();
        let valid = NewProduct {
            name: Some("Vision Pro".into()),
            price: Some(3499.0),
            category: Some("头显".into()),
            stock: Some(2),
        }
        .validate()
        .unwrap();
        let product = store.create(|id| build_product(id, valid)).unwrap();
        assert_eq!(product.id, 6);
    }
}
