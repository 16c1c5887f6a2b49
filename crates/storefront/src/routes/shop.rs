//! Catalog pages: home, shop listing and product detail.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::instrument;

use ballerz_core::{CatalogItem, CatalogQuery, SortOrder, Size, categories};

use crate::error::Result;
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::models::CurrentUser;
use crate::state::AppState;

/// Query string of `/shop` and `/api/catalog`.
///
/// Unknown sort values fall back to relevance instead of rejecting the
/// request.
#[derive(Debug, Default, Deserialize)]
pub struct ShopParams {
    pub category: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
}

impl ShopParams {
    fn into_query(self) -> CatalogQuery {
        CatalogQuery {
            category: self.category,
            search: self.search,
            sort: self
                .sort
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        }
        .normalized()
    }
}

/// Query string of the home page.
#[derive(Debug, Default, Deserialize)]
pub struct HomeParams {
    pub search: Option<String>,
}

/// One category row on the home page.
pub struct CategoryRow {
    pub name: String,
    pub items: Vec<CatalogItem>,
}

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub user: Option<CurrentUser>,
    pub search: String,
    pub rows: Vec<CategoryRow>,
}

/// Shop listing template.
#[derive(Template, WebTemplate)]
#[template(path = "shop.html")]
pub struct ShopTemplate {
    pub user: Option<CurrentUser>,
    pub items: Vec<CatalogItem>,
    pub categories: Vec<String>,
    pub selected_category: String,
    pub search: String,
    pub sort: SortOrder,
    pub sort_options: [SortOrder; 3],
}

/// Product page template.
#[derive(Template, WebTemplate)]
#[template(path = "product.html")]
pub struct ProductTemplate {
    pub user: Option<CurrentUser>,
    pub item: CatalogItem,
    pub related: Vec<CatalogItem>,
    pub sizes: [Size; 4],
}

/// 404 page template.
#[derive(Template, WebTemplate)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate {
    pub user: Option<CurrentUser>,
    pub message: String,
}

/// Group items by category, keeping the order in which categories first
/// appear.
fn group_by_category(items: &[CatalogItem]) -> Vec<CategoryRow> {
    let mut rows: Vec<CategoryRow> = Vec::new();
    for item in items {
        match rows.iter_mut().find(|row| row.name == item.category) {
            Some(row) => row.items.push(item.clone()),
            None => rows.push(CategoryRow {
                name: item.category.clone(),
                items: vec![item.clone()],
            }),
        }
    }
    rows
}

/// Display the home page: every category as a row, optionally narrowed by
/// a search term.
#[instrument(skip(state, user))]
pub async fn home(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Query(params): Query<HomeParams>,
) -> Result<HomeTemplate> {
    let search = params.search.unwrap_or_default();
    let query = CatalogQuery {
        search: Some(search.clone()),
        ..CatalogQuery::default()
    }
    .normalized();
    let items = state.catalog().list(&query).await?;

    Ok(HomeTemplate {
        user,
        search,
        rows: group_by_category(&items),
    })
}

/// Display the shop listing with category, search and sort.
#[instrument(skip(state, user))]
pub async fn shop(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Query(params): Query<ShopParams>,
) -> Result<ShopTemplate> {
    let query = params.into_query();
    let all = state.catalog().all().await?;
    let items = state.catalog().list(&query).await?;

    Ok(ShopTemplate {
        user,
        items: items.as_ref().clone(),
        categories: categories(&all),
        selected_category: query.category.unwrap_or_default(),
        search: query.search.unwrap_or_default(),
        sort: query.sort,
        sort_options: SortOrder::ALL,
    })
}

/// JSON catalog listing with the same filters as `/shop`.
#[instrument(skip(state))]
pub async fn catalog_json(
    State(state): State<AppState>,
    Query(params): Query<ShopParams>,
) -> Result<Json<Vec<CatalogItem>>> {
    let items = state.catalog().list(&params.into_query()).await?;
    Ok(Json(items.as_ref().clone()))
}

/// Display a product by its description.
#[instrument(skip(state, user))]
pub async fn product(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Path(description): Path<String>,
) -> Result<Response> {
    let Some(item) = state.catalog().by_description(&description).await? else {
        tracing::debug!(%description, "Product not found");
        return Ok(not_found_page(user, "Product not found"));
    };

    let related = state.catalog().related(&item).await?;

    Ok(ProductTemplate {
        user,
        item,
        related,
        sizes: Size::ALL,
    }
    .into_response())
}

/// Fallback for unknown paths.
pub async fn not_found(OptionalAuth(user): OptionalAuth) -> Response {
    not_found_page(user, "Page not found")
}

fn not_found_page(user: Option<CurrentUser>, message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        NotFoundTemplate {
            user,
            message: message.to_owned(),
        },
    )
        .into_response()
}
