use std::sync::Arc;

use precinct_domain::DomainResult;
use precinct_domain::error::DomainError;
use precinct_domain::ports::BoxFuture;
use precinct_domain::ports::documents::{
    Aggregation, Condition, Document, DocumentStore, Filter, GroupCount, ID_FIELD, Sort,
    UpdatePatch, validate_field_name,
};
use precinct_domain::util::uuid_v7_without_dashes;
use serde_json::{Map, Value};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::Client;

use crate::db::{DbConfig, connect};

/// Surreal record ids are not plain strings, so the store keeps its own copy
/// of the id in this field and exposes it as `id` on the way out.
const STORED_ID_FIELD: &str = "doc_id";

const SCHEMA: &str = "DEFINE INDEX IF NOT EXISTS evidence_doc_id ON TABLE evidence FIELDS doc_id UNIQUE; \
     DEFINE INDEX IF NOT EXISTS evidence_number_unique ON TABLE evidence FIELDS evidenceNumber UNIQUE;";

#[derive(Clone)]
pub struct SurrealDocumentStore {
    client: Arc<Surreal<Client>>,
}

impl SurrealDocumentStore {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }

    pub async fn new(db_config: &DbConfig) -> anyhow::Result<Self> {
        let store = Self::with_client(connect(db_config).await?);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> DomainResult<()> {
        let mut response = self
            .client
            .query(SCHEMA)
            .await
            .map_err(Self::map_surreal_error)?;
        for index in 0..response.num_statements() {
            let _: Vec<Value> = response.take(index).map_err(Self::map_surreal_error)?;
        }
        Ok(())
    }

    fn map_surreal_error(err: surrealdb::Error) -> DomainError {
        let error_message = err.to_string().to_lowercase();
        if error_message.contains("already exists")
            || error_message.contains("duplicate")
            || error_message.contains("unique")
            || error_message.contains("already contains")
        {
            return DomainError::Conflict;
        }
        DomainError::Persistence(format!("surreal query failed: {error_message}"))
    }

    fn decode_document(row: Value) -> DomainResult<Document> {
        let Value::Object(mut row) = row else {
            return Err(DomainError::Persistence(
                "surreal returned a non-object row".to_string(),
            ));
        };
        let id = row.remove(STORED_ID_FIELD).ok_or_else(|| {
            DomainError::Persistence("surreal row is missing its document id".to_string())
        })?;
        row.insert(ID_FIELD.to_string(), id);
        Ok(row)
    }

    async fn select(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
    ) -> DomainResult<Vec<Document>> {
        validate_field_name(collection)?;
        let (clause, params) = where_clause(filter)?;
        let sql = select_sql(&clause, sort, limit)?;
        let mut response = self
            .client
            .query(sql)
            .bind(("collection", collection.to_string()))
            .bind(("filter", params))
            .await
            .map_err(Self::map_surreal_error)?;
        let rows: Vec<Value> = response
            .take(0)
            .map_err(|err| DomainError::Persistence(format!("invalid query result: {err}")))?;
        rows.into_iter().map(Self::decode_document).collect()
    }

    async fn first_doc_id(&self, collection: &str, filter: &Filter) -> DomainResult<Option<String>> {
        let mut docs = self.select(collection, filter, None, Some(1)).await?;
        Ok(docs
            .pop()
            .and_then(|doc| doc.get(ID_FIELD).and_then(Value::as_str).map(str::to_string)))
    }
}

impl DocumentStore for SurrealDocumentStore {
    fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> BoxFuture<'_, DomainResult<Option<Document>>> {
        let collection = collection.to_string();
        let filter = filter.clone();
        Box::pin(async move {
            let mut docs = self.select(&collection, &filter, None, Some(1)).await?;
            Ok(docs.pop())
        })
    }

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> BoxFuture<'_, DomainResult<Vec<Document>>> {
        let collection = collection.to_string();
        let filter = filter.clone();
        let sort = sort.cloned();
        Box::pin(async move {
            self.select(&collection, &filter, sort.as_ref(), None)
                .await
        })
    }

    fn insert_one(
        &self,
        collection: &str,
        mut document: Document,
    ) -> BoxFuture<'_, DomainResult<String>> {
        let collection = collection.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            validate_field_name(&collection)?;
            let doc_id = uuid_v7_without_dashes();
            document.remove(ID_FIELD);
            document.insert(STORED_ID_FIELD.to_string(), Value::String(doc_id.clone()));
            let mut response = client
                .query("CREATE type::record($collection, $doc_id) CONTENT $doc RETURN NONE")
                .bind(("collection", collection.clone()))
                .bind(("doc_id", doc_id.clone()))
                .bind(("doc", Value::Object(document)))
                .await
                .map_err(Self::map_surreal_error)?;
            // Statement errors, including unique index violations, surface on take.
            let _: Vec<Value> = response.take(0).map_err(Self::map_surreal_error)?;
            tracing::debug!(collection, doc_id, "document inserted");
            Ok(doc_id)
        })
    }

    fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &UpdatePatch,
    ) -> BoxFuture<'_, DomainResult<u64>> {
        let collection = collection.to_string();
        let filter = filter.clone();
        let patch = patch.clone();
        Box::pin(async move {
            patch.validate()?;
            if patch.is_empty() {
                return Ok(0);
            }
            let Some(doc_id) = self.first_doc_id(&collection, &filter).await? else {
                return Ok(0);
            };
            let (assignments, set_params, push_params) = build_assignments(&patch);
            let sql = format!(
                "UPDATE type::record($collection, $doc_id) SET {assignments} \
                 WHERE {STORED_ID_FIELD} = $doc_id RETURN DIFF"
            );
            // A single UPDATE on one record is atomic, so array appends here
            // cannot interleave with another writer's append.
            let mut response = self
                .client
                .query(sql)
                .bind(("collection", collection.clone()))
                .bind(("doc_id", doc_id.clone()))
                .bind(("set", set_params))
                .bind(("push", push_params))
                .await
                .map_err(Self::map_surreal_error)?;
            let diffs: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Persistence(format!("invalid update result: {err}")))?;
            let modified = diffs
                .iter()
                .any(|diff| diff.as_array().is_some_and(|ops| !ops.is_empty()));
            tracing::debug!(collection, doc_id, modified, "document updated");
            Ok(u64::from(modified))
        })
    }

    fn delete_one(&self, collection: &str, filter: &Filter) -> BoxFuture<'_, DomainResult<u64>> {
        let collection = collection.to_string();
        let filter = filter.clone();
        Box::pin(async move {
            let Some(doc_id) = self.first_doc_id(&collection, &filter).await? else {
                return Ok(0);
            };
            let mut response = self
                .client
                .query("DELETE type::record($collection, $doc_id) RETURN BEFORE")
                .bind(("collection", collection.clone()))
                .bind(("doc_id", doc_id.clone()))
                .await
                .map_err(Self::map_surreal_error)?;
            let removed: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Persistence(format!("invalid delete result: {err}")))?;
            tracing::debug!(collection, doc_id, removed = removed.len(), "document deleted");
            Ok(removed.len().min(1) as u64)
        })
    }

    fn aggregate(
        &self,
        collection: &str,
        aggregation: &Aggregation,
    ) -> BoxFuture<'_, DomainResult<Vec<GroupCount>>> {
        let collection = collection.to_string();
        let aggregation = aggregation.clone();
        let client = self.client.clone();
        Box::pin(async move {
            validate_field_name(&collection)?;
            let sql = aggregate_sql(&aggregation)?;
            let mut response = client
                .query(sql)
                .bind(("collection", collection))
                .await
                .map_err(Self::map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Persistence(format!("invalid query result: {err}")))?;
            Ok(decode_groups(&aggregation, rows))
        })
    }
}

fn field_expr(field: &str) -> &str {
    if field == ID_FIELD {
        STORED_ID_FIELD
    } else {
        field
    }
}

/// Builds a WHERE clause over `$filter.pN` parameters. Field names are
/// checked against `[A-Za-z0-9_]` before they are embedded.
fn where_clause(filter: &Filter) -> DomainResult<(String, Value)> {
    filter.validate()?;
    let mut parts = Vec::new();
    let mut params = Map::new();
    for (index, condition) in filter.conditions().iter().enumerate() {
        let param = format!("p{index}");
        let (part, value) = match condition {
            Condition::Id(id) => (
                format!("{STORED_ID_FIELD} = $filter.{param}"),
                Value::String(id.clone()),
            ),
            Condition::Eq(field, value) => (
                format!("{} = $filter.{param}", field_expr(field)),
                value.clone(),
            ),
            Condition::Gte(field, value) => (
                format!("{} >= $filter.{param}", field_expr(field)),
                value.clone(),
            ),
            Condition::Lte(field, value) => (
                format!("{} <= $filter.{param}", field_expr(field)),
                value.clone(),
            ),
        };
        parts.push(part);
        params.insert(param, value);
    }
    Ok((parts.join(" AND "), Value::Object(params)))
}

fn select_sql(clause: &str, sort: Option<&Sort>, limit: Option<usize>) -> DomainResult<String> {
    let mut sql = String::from("SELECT * FROM type::table($collection)");
    if !clause.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
    if let Some(sort) = sort {
        validate_field_name(&sort.field)?;
        let direction = if sort.descending { "DESC" } else { "ASC" };
        sql.push_str(&format!(" ORDER BY {} {direction}", field_expr(&sort.field)));
    }
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    Ok(sql)
}

fn build_assignments(patch: &UpdatePatch) -> (String, Value, Value) {
    let mut parts = Vec::new();
    for field in patch.set.keys() {
        parts.push(format!("{field} = $set.{field}"));
    }
    let mut push_params = Map::new();
    for (index, (field, value)) in patch.push.iter().enumerate() {
        let param = format!("p{index}");
        parts.push(format!("{field} = array::append({field} ?? [], $push.{param})"));
        push_params.insert(param, value.clone());
    }
    (
        parts.join(", "),
        Value::Object(patch.set.clone()),
        Value::Object(push_params),
    )
}

fn aggregate_sql(aggregation: &Aggregation) -> DomainResult<String> {
    match aggregation {
        Aggregation::Count => {
            Ok("SELECT count() AS count FROM type::table($collection) GROUP ALL".to_string())
        }
        Aggregation::CountBy { field } => {
            validate_field_name(field)?;
            let field = field_expr(field);
            Ok(format!(
                "SELECT {field}, count() AS count FROM type::table($collection) GROUP BY {field}"
            ))
        }
    }
}

fn decode_groups(aggregation: &Aggregation, rows: Vec<Value>) -> Vec<GroupCount> {
    match aggregation {
        Aggregation::Count => {
            let count = rows
                .first()
                .and_then(|row| row.get("count"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            vec![GroupCount {
                key: Value::Null,
                count,
            }]
        }
        Aggregation::CountBy { field } => rows
            .into_iter()
            .map(|row| GroupCount {
                key: row.get(field_expr(field)).cloned().unwrap_or(Value::Null),
                count: row.get("count").and_then(Value::as_u64).unwrap_or(0),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn where_clause_binds_values_and_maps_id() {
        let filter = Filter::by_id("abc")
            .eq("status", "open")
            .gte("createdAtMs", 10);
        let (clause, params) = where_clause(&filter).expect("clause");
        assert_eq!(
            clause,
            "doc_id = $filter.p0 AND status = $filter.p1 AND createdAtMs >= $filter.p2"
        );
        assert_eq!(params, json!({ "p0": "abc", "p1": "open", "p2": 10 }));
    }

    #[test]
    fn where_clause_rejects_injection() {
        let filter = Filter::all().eq("status = 1 OR true", "x");
        assert!(where_clause(&filter).is_err());
    }

    #[test]
    fn select_sql_appends_order_and_limit() {
        let sql = select_sql("status = $filter.p0", Some(&Sort::descending("createdAtMs")), Some(1))
            .expect("sql");
        assert_eq!(
            sql,
            "SELECT * FROM type::table($collection) WHERE status = $filter.p0 \
             ORDER BY createdAtMs DESC LIMIT 1"
        );
        assert_eq!(
            select_sql("", None, None).expect("sql"),
            "SELECT * FROM type::table($collection)"
        );
    }

    #[test]
    fn assignments_push_with_array_append() {
        let patch = UpdatePatch::new()
            .push("custodyLog", json!({ "action": "moved" }))
            .set("updatedAtMs", 5);
        let (sql, set, push) = build_assignments(&patch);
        assert_eq!(
            sql,
            "updatedAtMs = $set.updatedAtMs, custodyLog = array::append(custodyLog ?? [], $push.p0)"
        );
        assert_eq!(set, json!({ "updatedAtMs": 5 }));
        assert_eq!(push, json!({ "p0": { "action": "moved" } }));
    }

    #[test]
    fn count_by_groups_on_field() {
        let sql = aggregate_sql(&Aggregation::CountBy {
            field: "status".into(),
        })
        .expect("sql");
        assert_eq!(
            sql,
            "SELECT status, count() AS count FROM type::table($collection) GROUP BY status"
        );
    }

    #[test]
    fn decodes_group_rows() {
        let aggregation = Aggregation::CountBy {
            field: "type".into(),
        };
        let groups = decode_groups(
            &aggregation,
            vec![json!({ "type": "Weapon", "count": 2 }), json!({ "count": 1 })],
        );
        assert_eq!(
            groups,
            vec![
                GroupCount {
                    key: json!("Weapon"),
                    count: 2
                },
                GroupCount {
                    key: Value::Null,
                    count: 1
                },
            ]
        );
        assert_eq!(decode_groups(&Aggregation::Count, Vec::new())[0].count, 0);
    }

    #[test]
    fn decoded_rows_expose_doc_id_as_id() {
        let doc = SurrealDocumentStore::decode_document(json!({
            "id": "evidence:abc",
            "doc_id": "abc",
            "status": "open"
        }))
        .expect("doc");
        assert_eq!(doc.get("id"), Some(&json!("abc")));
        assert!(!doc.contains_key("doc_id"));
    }
}
