//! Staged list-query builder
//!
//! [`QueryFeatures`] turns query-string parameters into a filter, sort,
//! projection and page window for one collection. Each stage method returns a
//! new builder with that stage enabled; nothing is evaluated until
//! [`QueryFeatures::compile`] or [`QueryFeatures::execute`], so the order the
//! stages are enabled in does not matter.

use std::fmt;
use std::sync::Arc;

use bson::{doc, Bson, Document};

use super::cast::{Schema, CREATED_AT};
use super::pagination::{ListPage, PageRequest, Pagination, DEFAULT_LIMIT, DEFAULT_PAGE};
use super::params::{positive_or, QueryParams};
use super::populate::Populate;
use super::QueryError;
use crate::error::Result;
use crate::store::{DocumentStore, FindOptions};

/// Field matched by the `search` parameter
pub const SEARCH_FIELD: &str = "name";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Stages {
    filter: bool,
    search: bool,
    sort: bool,
    fields: bool,
    paginate: bool,
}

/// A list query ready to send to the store
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// Combined filter
    pub filter: Document,
    /// Sort specification, when the sort stage is enabled
    pub sort: Option<Document>,
    /// Projection, when the field-selection stage is enabled
    pub projection: Option<Document>,
    /// Page window, when paginating and a `page` was supplied
    pub page: Option<PageRequest>,
}

impl CompiledQuery {
    /// Store options for fetching the records
    pub fn find_options(&self) -> FindOptions {
        let mut options = FindOptions {
            sort: self.sort.clone(),
            projection: self.projection.clone(),
            ..FindOptions::default()
        };
        if let Some(page) = self.page {
            // MongoDB encodes skip and limit as signed 64-bit integers
            let skip = page.skip().min(i64::MAX.unsigned_abs());
            let limit = i64::try_from(page.limit).unwrap_or(i64::MAX);
            options = options.with_window(skip, limit);
        }
        options
    }
}

/// Builder for filtered, searched, sorted, projected and paginated list queries
///
/// # Example
///
/// ```rust,ignore
/// use storefront::query::{QueryFeatures, QueryParams};
/// use storefront::resources::PRODUCTS;
///
/// let params = QueryParams::from_pairs([("price[gte]", "100"), ("page", "2"), ("limit", "3")]);
/// let page = QueryFeatures::new(store, PRODUCTS.collection, PRODUCTS.schema, params)
///     .all_features()
///     .execute()
///     .await?;
/// assert!(page.pagination().is_some());
/// ```
pub struct QueryFeatures {
    store: Arc<dyn DocumentStore>,
    collection: String,
    schema: &'static Schema,
    params: QueryParams,
    initial_filter: Document,
    populate: Option<Populate>,
    stages: Stages,
}

impl fmt::Debug for QueryFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryFeatures")
            .field("collection", &self.collection)
            .field("params", &self.params)
            .field("initial_filter", &self.initial_filter)
            .field("populate", &self.populate)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

impl QueryFeatures {
    /// Start a query over `collection` with no stages enabled
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        schema: &'static Schema,
        params: QueryParams,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            schema,
            params,
            initial_filter: Document::new(),
            populate: None,
            stages: Stages::default(),
        }
    }

    /// AND a caller-supplied filter with whatever the parameters add
    #[must_use]
    pub fn with_initial_filter(mut self, filter: Document) -> Self {
        if filter.is_empty() {
            return self;
        }
        self.initial_filter = if self.initial_filter.is_empty() {
            filter
        } else {
            doc! { "$and": [std::mem::take(&mut self.initial_filter), filter] }
        };
        self
    }

    /// Expand a reference field on every returned record
    #[must_use]
    pub fn with_populate(mut self, populate: Option<Populate>) -> Self {
        self.populate = populate;
        self
    }

    /// Constrain fields from the non-reserved parameters
    #[must_use]
    pub fn filter(mut self) -> Self {
        self.stages.filter = true;
        self
    }

    /// Case-insensitive substring match of `search` against `name`
    #[must_use]
    pub fn search(mut self) -> Self {
        self.stages.search = true;
        self
    }

    /// Order by `sort`, newest first when absent
    #[must_use]
    pub fn sort(mut self) -> Self {
        self.stages.sort = true;
        self
    }

    /// Shape records by `fields`, dropping `__v` when absent
    #[must_use]
    pub fn limit_fields(mut self) -> Self {
        self.stages.fields = true;
        self
    }

    /// Window by `page` and `limit` when `page` is supplied
    #[must_use]
    pub fn paginate(mut self) -> Self {
        self.stages.paginate = true;
        self
    }

    /// Enable every stage
    #[must_use]
    pub fn all_features(self) -> Self {
        self.filter().search().sort().limit_fields().paginate()
    }

    /// Compile the enabled stages
    ///
    /// Fails with a cast error when a parameter value does not fit its field,
    /// and with a query error for operator-like field names or mixed
    /// inclusion/exclusion in `fields`.
    pub fn compile(&self) -> Result<CompiledQuery> {
        let mut clauses = Vec::new();
        if !self.initial_filter.is_empty() {
            clauses.push(self.initial_filter.clone());
        }
        if self.stages.filter {
            if let Some(fields) = self.field_clause()? {
                clauses.push(fields);
            }
        }
        if self.stages.search {
            if let Some(search) = self.search_clause() {
                clauses.push(search);
            }
        }

        let filter = match clauses.len() {
            0 => Document::new(),
            1 => clauses.remove(0),
            _ => doc! { "$and": clauses },
        };

        let sort = if self.stages.sort {
            Some(self.sort_spec()?)
        } else {
            None
        };

        let projection = if self.stages.fields {
            Some(self.projection_spec()?)
        } else {
            None
        };

        let page = (self.stages.paginate && self.params.contains("page")).then(|| {
            PageRequest::new(
                positive_or(self.params.get("page"), DEFAULT_PAGE),
                positive_or(self.params.get("limit"), DEFAULT_LIMIT),
            )
        });

        Ok(CompiledQuery {
            filter,
            sort,
            projection,
            page,
        })
    }

    /// Compile and run the query
    ///
    /// Paged queries count matching documents first; the count and the fetch
    /// are separate round-trips.
    pub async fn execute(self) -> Result<ListPage<Document>> {
        let compiled = self.compile()?;
        tracing::debug!(
            collection = %self.collection,
            filter = %compiled.filter,
            paged = compiled.page.is_some(),
            "Executing list query"
        );

        let pagination = match compiled.page {
            Some(page) => {
                let total = self
                    .store
                    .count(&self.collection, compiled.filter.clone())
                    .await?;
                Some(Pagination::new(total, page))
            }
            None => None,
        };

        let options = compiled.find_options();
        let mut records = self
            .store
            .find(&self.collection, compiled.filter, options)
            .await?;

        if let Some(populate) = &self.populate {
            populate.apply(self.store.as_ref(), &mut records).await?;
        }

        Ok(match pagination {
            Some(pagination) => ListPage::Paged {
                records,
                pagination,
            },
            None => ListPage::Unpaged(records),
        })
    }

    fn field_clause(&self) -> Result<Option<Document>> {
        struct Constraint {
            path: String,
            equals: Vec<Bson>,
            ranges: Document,
        }

        let mut constraints: Vec<Constraint> = Vec::new();
        for field in self.params.field_filters() {
            validate_path(&field.path)?;
            if self.schema.is_hidden(&field.path) {
                tracing::debug!(path = %field.path, "Ignoring filter on hidden field");
                continue;
            }

            let value = self.schema.cast_query(&field.path, &field.value)?;
            let index = match constraints.iter().position(|c| c.path == field.path) {
                Some(index) => index,
                None => {
                    constraints.push(Constraint {
                        path: field.path.clone(),
                        equals: Vec::new(),
                        ranges: Document::new(),
                    });
                    constraints.len() - 1
                }
            };

            let constraint = &mut constraints[index];
            match field.op {
                None => {
                    if !constraint.equals.contains(&value) {
                        constraint.equals.push(value);
                    }
                }
                Some(op) => {
                    if !constraint.ranges.contains_key(op.operator()) {
                        constraint.ranges.insert(op.operator(), value);
                    }
                }
            }
        }

        if constraints.is_empty() {
            return Ok(None);
        }

        let mut clause = Document::new();
        for Constraint {
            path,
            mut equals,
            ranges,
        } in constraints
        {
            if equals.len() == 1 && ranges.is_empty() {
                clause.insert(path, equals.remove(0));
                continue;
            }

            let mut operators = Document::new();
            match equals.len() {
                0 => {}
                1 => {
                    operators.insert("$eq", equals.remove(0));
                }
                _ => {
                    operators.insert("$in", equals);
                }
            }
            operators.extend(ranges);
            clause.insert(path, operators);
        }

        Ok(Some(clause))
    }

    fn search_clause(&self) -> Option<Document> {
        let term = self.params.get("search")?;
        if term.is_empty() {
            return None;
        }
        Some(doc! {
            SEARCH_FIELD: { "$regex": regex::escape(term), "$options": "i" }
        })
    }

    fn sort_spec(&self) -> Result<Document> {
        let mut spec = Document::new();
        for token in tokens(self.params.get("sort")) {
            let (field, direction) = match token.strip_prefix('-') {
                Some(field) => (field, -1),
                None => (token, 1),
            };
            if field.is_empty() {
                continue;
            }
            validate_path(field)?;
            if self.schema.is_hidden(field) || spec.contains_key(field) {
                continue;
            }
            spec.insert(field, direction);
        }

        if spec.is_empty() {
            spec.insert(CREATED_AT, -1);
        }
        Ok(spec)
    }

    fn projection_spec(&self) -> Result<Document> {
        let mut included: Vec<&str> = Vec::new();
        let mut excluded: Vec<&str> = Vec::new();
        let mut id_flag: Option<bool> = None;

        for token in tokens(self.params.get("fields")) {
            let (field, include) = match token.strip_prefix('-') {
                Some(field) => (field, false),
                None => (token, true),
            };
            if field.is_empty() {
                continue;
            }
            validate_path(field)?;

            if field == "_id" {
                id_flag.get_or_insert(include);
                continue;
            }

            let conflicting = if include { &excluded } else { &included };
            if !conflicting.is_empty() {
                return Err(QueryError::MixedProjection {
                    field: token.to_string(),
                }
                .into());
            }
            if include {
                included.push(field);
            } else {
                excluded.push(field);
            }
        }

        if !included.is_empty() {
            let mut projection = Document::new();
            for field in included {
                if !self.schema.is_hidden(field) {
                    projection.insert(field, 1);
                }
            }
            if projection.is_empty() {
                return Ok(doc! { "_id": 1 });
            }
            if id_flag == Some(false) {
                projection.insert("_id", 0);
            }
            return Ok(projection);
        }

        match (excluded.is_empty(), id_flag) {
            (true, None) => Ok(self.schema.default_projection()),
            (true, Some(true)) => Ok(doc! { "_id": 1 }),
            _ => {
                let mut projection = Document::new();
                for field in excluded {
                    projection.insert(field, 0);
                }
                for hidden in self.schema.hidden {
                    projection.insert(*hidden, 0);
                }
                if id_flag == Some(false) {
                    projection.insert("_id", 0);
                }
                Ok(projection)
            }
        }
    }
}

/// Comma or whitespace separated tokens, empty ones dropped
fn tokens(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
}

/// Reject paths that would be read as store operators
fn validate_path(path: &str) -> std::result::Result<(), QueryError> {
    if path
        .split('.')
        .any(|segment| segment.is_empty() || segment.starts_with('$'))
    {
        return Err(QueryError::InvalidField(path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::query::cast::{FieldDef, FieldKind};
    use crate::store::InMemoryStore;
    use bson::oid::ObjectId;

    const FIELDS: &[FieldDef] = &[
        FieldDef::new("name", FieldKind::String),
        FieldDef::new("price", FieldKind::Number),
        FieldDef::new("category", FieldKind::String),
        FieldDef::new("seller", FieldKind::ObjectId),
        FieldDef::new("secret", FieldKind::String),
    ];
    const SCHEMA: Schema = Schema::new(FIELDS, &["secret"]);

    const BASE_MILLIS: i64 = 1_700_000_000_000;

    async fn seeded() -> Arc<dyn DocumentStore> {
        let store = InMemoryStore::new();
        for i in 0..10_i64 {
            store
                .insert_one(
                    "products",
                    doc! {
                        "name": format!("Product {i}"),
                        "price": i * 50,
                        "category": if i % 2 == 0 { "kitchen" } else { "garden" },
                        "secret": "hunter2",
                        "createdAt": bson::DateTime::from_millis(BASE_MILLIS + i * 1000),
                        "__v": 0,
                    },
                )
                .await
                .unwrap();
        }
        Arc::new(store)
    }

    fn features(store: &Arc<dyn DocumentStore>, pairs: &[(&str, &str)]) -> QueryFeatures {
        let params: QueryParams = pairs.iter().copied().collect();
        QueryFeatures::new(store.clone(), "products", &SCHEMA, params).all_features()
    }

    fn names(page: &ListPage<Document>) -> Vec<String> {
        page.records()
            .iter()
            .map(|d| d.get_str("name").unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_unpaged_without_page_parameter() {
        let store = seeded().await;
        let page = features(&store, &[("limit", "3")]).execute().await.unwrap();

        assert!(page.pagination().is_none());
        assert_eq!(page.len(), 10);
    }

    #[tokio::test]
    async fn test_second_page_of_ten() {
        let store = seeded().await;
        let page = features(&store, &[("page", "2"), ("limit", "3")])
            .execute()
            .await
            .unwrap();

        assert_eq!(
            page.pagination(),
            Some(&Pagination {
                total: 10,
                limit: 3,
                pages: 4,
                page: 2,
                skip: 3
            })
        );
        assert_eq!(names(&page), vec!["Product 6", "Product 5", "Product 4"]);
    }

    #[tokio::test]
    async fn test_page_past_the_end_is_empty() {
        let store = seeded().await;
        let page = features(&store, &[("page", "5"), ("limit", "3")])
            .execute()
            .await
            .unwrap();

        assert!(page.is_empty());
        assert_eq!(page.pagination().map(|p| p.skip), Some(12));
    }

    #[tokio::test]
    async fn test_huge_page_clamps_skip_and_returns_empty_page() {
        let store = seeded().await;
        let query = features(&store, &[("page", "2000000000000000000"), ("limit", "100")]);
        let options = query.compile().unwrap().find_options();
        assert_eq!(options.skip, Some(i64::MAX.unsigned_abs()));
        assert_eq!(options.limit, Some(100));

        let page = query.execute().await.unwrap();
        assert!(page.is_empty());
        assert_eq!(page.pagination().map(|p| p.total), Some(10));
    }

    #[tokio::test]
    async fn test_malformed_page_and_limit_use_defaults() {
        let store = seeded().await;
        let page = features(&store, &[("page", "abc"), ("limit", "-1")])
            .execute()
            .await
            .unwrap();

        let pagination = page.pagination().unwrap();
        assert_eq!((pagination.page, pagination.limit), (1, 8));
        assert_eq!(page.len(), 8);
    }

    #[tokio::test]
    async fn test_price_range() {
        let store = seeded().await;
        let page = features(&store, &[("price[gte]", "100"), ("price[lte]", "200")])
            .execute()
            .await
            .unwrap();

        assert_eq!(page.len(), 3);
        for record in page.records() {
            let price = record.get_i64("price").unwrap();
            assert!((100..=200).contains(&price));
        }
    }

    #[tokio::test]
    async fn test_initial_filter_is_anded() {
        let store = seeded().await;
        let page = features(&store, &[("category", "garden")])
            .with_initial_filter(doc! { "category": "kitchen" })
            .execute()
            .await
            .unwrap();
        assert!(page.is_empty());

        let page = features(&store, &[("price[lt]", "200")])
            .with_initial_filter(doc! { "category": "kitchen" })
            .execute()
            .await
            .unwrap();
        assert_eq!(names(&page), vec!["Product 2", "Product 0"]);
    }

    #[tokio::test]
    async fn test_repeated_keys_become_membership() {
        let store = seeded().await;
        let query = features(&store, &[("price", "0"), ("price", "50"), ("price", "450")]);
        assert_eq!(
            query.compile().unwrap().filter,
            doc! { "price": { "$in": [0_i64, 50_i64, 450_i64] } }
        );
        assert_eq!(query.execute().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_operator_words_in_values_are_literal() {
        let store = seeded().await;
        let query = features(&store, &[("category", "lt")]);
        assert_eq!(query.compile().unwrap().filter, doc! { "category": "lt" });
        assert!(query.execute().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_needs_name() {
        let store = seeded().await;
        store
            .insert_one("products", doc! { "title": "product 99" })
            .await
            .unwrap();

        let page = features(&store, &[("search", "PRODUCT 1")])
            .execute()
            .await
            .unwrap();
        assert_eq!(names(&page), vec!["Product 1"]);

        let page = features(&store, &[("search", "product")])
            .execute()
            .await
            .unwrap();
        assert_eq!(page.len(), 10);
    }

    #[tokio::test]
    async fn test_search_escapes_pattern_characters() {
        let store = seeded().await;
        let page = features(&store, &[("search", "Product .")])
            .execute()
            .await
            .unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_search_keeps_surrounding_whitespace() {
        let store = seeded().await;
        store
            .insert_one("products", doc! { "name": "Product 1 x", "price": 10_i64 })
            .await
            .unwrap();

        let page = features(&store, &[("search", "Product 1 ")])
            .execute()
            .await
            .unwrap();
        assert_eq!(names(&page), vec!["Product 1 x"]);
    }

    #[tokio::test]
    async fn test_default_sort_is_newest_first() {
        let store = seeded().await;
        let page = features(&store, &[]).execute().await.unwrap();
        let created: Vec<i64> = page
            .records()
            .iter()
            .map(|d| d.get_datetime("createdAt").unwrap().timestamp_millis())
            .collect();
        assert!(created.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn test_multi_key_sort() {
        let store = seeded().await;
        let pairs = [("sort", "category,-price"), ("page", "1"), ("limit", "2")];
        let page = features(&store, &pairs)
            .execute()
            .await
            .unwrap();
        assert_eq!(names(&page), vec!["Product 9", "Product 7"]);
    }

    #[tokio::test]
    async fn test_fields_select_exact_shape() {
        let store = seeded().await;
        let page = features(&store, &[("fields", "name,price")])
            .execute()
            .await
            .unwrap();
        for record in page.records() {
            let keys: Vec<&str> = record.keys().map(String::as_str).collect();
            assert_eq!(keys, vec!["_id", "name", "price"]);
        }
    }

    #[tokio::test]
    async fn test_default_projection_drops_version_and_hidden() {
        let store = seeded().await;
        let page = features(&store, &[]).execute().await.unwrap();
        for record in page.records() {
            assert!(!record.contains_key("__v"));
            assert!(!record.contains_key("secret"));
            assert!(record.contains_key("name"));
        }
    }

    #[tokio::test]
    async fn test_hidden_fields_cannot_be_selected() {
        let store = seeded().await;
        for fields in ["secret", "name,secret", "-price"] {
            let page = features(&store, &[("fields", fields)])
                .execute()
                .await
                .unwrap();
            assert!(
                page.records().iter().all(|r| !r.contains_key("secret")),
                "fields={fields}"
            );
        }
    }

    #[tokio::test]
    async fn test_mixed_projection_is_rejected() {
        let store = seeded().await;
        let err = features(&store, &[("fields", "name,-price")])
            .compile()
            .unwrap_err();
        assert!(matches!(err, Error::Query(QueryError::MixedProjection { .. })));

        let compiled = features(&store, &[("fields", "name,-_id")]).compile().unwrap();
        assert_eq!(compiled.projection, Some(doc! { "name": 1, "_id": 0 }));
    }

    #[tokio::test]
    async fn test_cast_failure_propagates() {
        let store = seeded().await;
        let err = features(&store, &[("seller", "not-an-id")])
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cast(ref e) if e.path == "seller"));

        let seller = ObjectId::new();
        let hex = seller.to_hex();
        let compiled = features(&store, &[("seller", hex.as_str())])
            .compile()
            .unwrap();
        assert_eq!(compiled.filter, doc! { "seller": seller });
    }

    #[tokio::test]
    async fn test_operator_field_names_are_rejected() {
        let store = seeded().await;
        for key in ["$where", "price[$gt]", "a..b"] {
            let err = features(&store, &[(key, "1")]).compile().unwrap_err();
            assert!(matches!(err, Error::Query(QueryError::InvalidField(_))), "key {key}");
        }
    }

    #[tokio::test]
    async fn test_stage_order_does_not_matter() {
        let store = seeded().await;
        let params: QueryParams = [("price[gt]", "10"), ("sort", "price"), ("page", "2")]
            .into_iter()
            .collect();

        let forward = QueryFeatures::new(store.clone(), "products", &SCHEMA, params.clone())
            .filter()
            .search()
            .sort()
            .limit_fields()
            .paginate()
            .compile()
            .unwrap();
        let backward = QueryFeatures::new(store.clone(), "products", &SCHEMA, params)
            .paginate()
            .limit_fields()
            .sort()
            .search()
            .filter()
            .compile()
            .unwrap();
        assert_eq!(forward, backward);
    }

    #[tokio::test]
    async fn test_disabled_stages_leave_query_untouched() {
        let store = seeded().await;
        let params: QueryParams = [("price", "50"), ("page", "1")].into_iter().collect();
        let compiled = QueryFeatures::new(store, "products", &SCHEMA, params)
            .compile()
            .unwrap();
        assert_eq!(
            compiled,
            CompiledQuery {
                filter: Document::new(),
                sort: None,
                projection: None,
                page: None,
            }
        );
    }

    #[tokio::test]
    async fn test_repeat_execution_is_identical() {
        let store = seeded().await;
        let pairs = [("category", "kitchen"), ("sort", "-price"), ("page", "1"), ("limit", "2")];
        let first = features(&store, &pairs).execute().await.unwrap();
        let second = features(&store, &pairs).execute().await.unwrap();
        assert_eq!(first, second);
    }
}
