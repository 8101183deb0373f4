use std::fmt;

use anyhow::Context as AnyhowContext;
use async_graphql::{
    connection::{query, Connection, EmptyFields},
    Context, InputObject, Object, Result, SimpleObject, ID,
};
use jiff::Timestamp;

use super::{parse_id, DateTimeUtc};
use crate::database::{self, parse_key, Database, TryFromKeyValue};

#[derive(SimpleObject)]
pub(crate) struct Customer {
    pub(crate) id: ID,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) total_spend: f64,
    pub(crate) last_visit: DateTimeUtc,
    pub(crate) tags: Vec<String>,
    pub(crate) created_at: DateTimeUtc,
}

impl Customer {
    pub(crate) fn from_record(id: u64, record: database::customer::Customer) -> Self {
        Self {
            id: ID(id.to_string()),
            name: record.name,
            email: record.email,
            total_spend: record.total_spend,
            last_visit: DateTimeUtc(record.last_visit),
            tags: record.tags,
            created_at: DateTimeUtc(record.created_at),
        }
    }
}

impl TryFromKeyValue for Customer {
    fn try_from_key_value(key: &[u8], value: &[u8]) -> anyhow::Result<Self> {
        let id = parse_key(key)
            .with_context(|| format!("invalid key in database: {key:02x?}"))?;
        let record = bincode::deserialize::<database::customer::Customer>(value)
            .with_context(|| format!("invalid value in database for key {key:02x?}"))?;
        Ok(Customer::from_record(id, record))
    }
}

impl fmt::Display for Customer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.id.as_str())
    }
}

#[derive(InputObject)]
pub(crate) struct CustomerInput {
    name: String,
    email: String,
    #[graphql(default)]
    total_spend: f64,
    last_visit: Option<DateTimeUtc>,
    #[graphql(default)]
    tags: Vec<String>,
}

impl CustomerInput {
    fn into_record(self, created_at: Timestamp) -> Result<database::customer::Customer> {
        if self.name.trim().is_empty() {
            return Err("customer name is required".into());
        }
        if !self.email.contains('@') {
            return Err("must be a valid email".into());
        }
        if self.total_spend < 0.0 {
            return Err("totalSpend cannot be negative".into());
        }
        Ok(database::customer::Customer {
            name: self.name.trim().to_string(),
            email: self.email.to_lowercase(),
            total_spend: self.total_spend,
            last_visit: self.last_visit.map_or_else(Timestamp::now, |t| t.0),
            tags: self.tags,
            created_at,
        })
    }
}

#[derive(Default)]
pub(crate) struct CustomerQuery;

#[Object]
impl CustomerQuery {
    async fn customers(
        &self,
        ctx: &Context<'_>,
        after: Option<String>,
        before: Option<String>,
        first: Option<i32>,
        last: Option<i32>,
    ) -> Result<Connection<String, Customer, EmptyFields, EmptyFields>> {
        query(
            after,
            before,
            first,
            last,
            |after, before, first, last| async move {
                super::load_connection(
                    ctx,
                    |db, start, end| db.customers(start, end),
                    after,
                    before,
                    first,
                    last,
                )
            },
        )
        .await
    }

    async fn customer(&self, ctx: &Context<'_>, id: ID) -> Result<Customer> {
        let db = ctx.data::<Database>()?;
        let id = parse_id(&id)?;
        let record = db
            .customer(id)
            .map_err(|e| format!("failed to read database: {e}"))?
            .ok_or("customer not found")?;
        Ok(Customer::from_record(id, record))
    }
}

#[derive(Default)]
pub(crate) struct CustomerMutation;

#[Object]
impl CustomerMutation {
    async fn create_customer(&self, ctx: &Context<'_>, input: CustomerInput) -> Result<Customer> {
        let db = ctx.data::<Database>()?;
        let record = input.into_record(Timestamp::now())?;
        let id = db
            .insert_customer(&record)
            .map_err(|e| format!("failed to write database: {e}"))?;
        Ok(Customer::from_record(id, record))
    }

    async fn update_customer(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: CustomerInput,
    ) -> Result<Customer> {
        let db = ctx.data::<Database>()?;
        let id = parse_id(&id)?;
        let existing = db
            .customer(id)
            .map_err(|e| format!("failed to read database: {e}"))?
            .ok_or("customer not found")?;
        let record = input.into_record(existing.created_at)?;
        db.update_customer(id, &record)
            .map_err(|e| format!("failed to write database: {e}"))?;
        Ok(Customer::from_record(id, record))
    }

    async fn delete_customer(&self, ctx: &Context<'_>, id: ID) -> Result<bool> {
        let db = ctx.data::<Database>()?;
        let id = parse_id(&id)?;
        db.delete_customer(id)
            .map_err(|e| format!("failed to write database: {e}"))
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use crate::graphql::TestSchema;

    #[tokio::test]
    async fn customers_empty() {
        let schema = TestSchema::new();
        let query = r#"
        {
            customers {
                edges {
                    node {
                        name
                    }
                }
            }
        }"#;
        let res = schema.execute(query).await;
        assert_eq!(res.data.to_string(), "{customers: {edges: []}}");
    }

    #[tokio::test]
    async fn create_and_fetch_customer() {
        let schema = TestSchema::new();
        let res = schema
            .execute(
                r#"mutation {
                    createCustomer(input: {
                        name: "Ada",
                        email: "ADA@Example.com",
                        totalSpend: 42.5,
                        tags: ["vip"]
                    }) {
                        id
                        email
                    }
                }"#,
            )
            .await;
        assert!(res.errors.is_empty(), "{:?}", res.errors);
        let data = res.data.into_json().unwrap();
        let id = data["createCustomer"]["id"].as_str().unwrap().to_string();
        // Emails are normalized to lowercase.
        assert_eq!(data["createCustomer"]["email"], "ada@example.com");

        let res = schema
            .execute(&format!(
                r#"{{ customer(id: "{id}") {{ name totalSpend tags }} }}"#
            ))
            .await;
        let data = res.data.into_json().unwrap();
        assert_eq!(data["customer"]["name"], "Ada");
        assert_eq!(data["customer"]["totalSpend"], 42.5);
        assert_eq!(data["customer"]["tags"][0], "vip");
    }

    #[tokio::test]
    async fn update_and_delete_customer() {
        let schema = TestSchema::new();
        let res = schema
            .execute(
                r#"mutation {
                    createCustomer(input: { name: "Bo", email: "bo@example.com" }) { id }
                }"#,
            )
            .await;
        let data = res.data.into_json().unwrap();
        let id = data["createCustomer"]["id"].as_str().unwrap().to_string();

        let res = schema
            .execute(&format!(
                r#"mutation {{
                    updateCustomer(id: "{id}", input: {{
                        name: "Bo",
                        email: "bo@example.com",
                        totalSpend: 99
                    }}) {{ totalSpend }}
                }}"#
            ))
            .await;
        let data = res.data.into_json().unwrap();
        assert_eq!(data["updateCustomer"]["totalSpend"], 99.0);

        let res = schema
            .execute(&format!(r#"mutation {{ deleteCustomer(id: "{id}") }}"#))
            .await;
        let data = res.data.into_json().unwrap();
        assert_eq!(data["deleteCustomer"], true);

        let res = schema
            .execute(&format!(r#"{{ customer(id: "{id}") {{ name }} }}"#))
            .await;
        assert!(!res.errors.is_empty());
    }

    #[tokio::test]
    async fn invalid_input_is_rejected() {
        let schema = TestSchema::new();
        let res = schema
            .execute(
                r#"mutation {
                    createCustomer(input: { name: "", email: "a@b.c" }) { id }
                }"#,
            )
            .await;
        assert!(!res.errors.is_empty());

        let res = schema
            .execute(
                r#"mutation {
                    createCustomer(input: { name: "A", email: "not-an-email" }) { id }
                }"#,
            )
            .await;
        assert!(!res.errors.is_empty());
    }

    #[tokio::test]
    async fn customers_first_pages_through_insertion_order() {
        let schema = TestSchema::new();
        for name in ["one", "two", "three"] {
            let res = schema
                .execute(&format!(
                    r#"mutation {{
                        createCustomer(input: {{ name: "{name}", email: "{name}@example.com" }}) {{ id }}
                    }}"#
                ))
                .await;
            assert!(res.errors.is_empty(), "{:?}", res.errors);
        }

        let res = schema
            .execute(
                r#"{
                    customers(first: 2) {
                        edges { node { name } }
                        pageInfo { hasNextPage }
                    }
                }"#,
            )
            .await;
        let data = res.data.into_json().unwrap();
        let edges = data["customers"]["edges"].as_array().unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0]["node"]["name"], "one");
        assert_eq!(edges[1]["node"]["name"], "two");
        assert_eq!(data["customers"]["pageInfo"]["hasNextPage"], true);
    }
}
