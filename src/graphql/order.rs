use std::fmt;

use anyhow::Context as AnyhowContext;
use async_graphql::{
    connection::{query, Connection, EmptyFields},
    ComplexObject, Context, InputObject, Object, Result, SimpleObject, ID,
};
use jiff::Timestamp;

use super::{customer::Customer, parse_id, DateTimeUtc};
use crate::database::{self, parse_key, Database, TryFromKeyValue};

#[derive(SimpleObject)]
#[graphql(complex)]
pub(crate) struct Order {
    pub(crate) id: ID,
    pub(crate) customer_id: ID,
    pub(crate) amount: f64,
    pub(crate) items: Vec<OrderItem>,
    pub(crate) order_date: DateTimeUtc,
}

#[ComplexObject]
impl Order {
    /// The customer this order belongs to, if it still exists.
    async fn customer(&self, ctx: &Context<'_>) -> Result<Option<Customer>> {
        let db = ctx.data::<Database>()?;
        let id = parse_id(&self.customer_id)?;
        let record = db
            .customer(id)
            .map_err(|e| format!("failed to read database: {e}"))?;
        Ok(record.map(|record| Customer::from_record(id, record)))
    }
}

#[derive(SimpleObject)]
pub(crate) struct OrderItem {
    pub(crate) name: String,
    pub(crate) quantity: u32,
    pub(crate) price: f64,
}

#[derive(InputObject)]
pub(crate) struct OrderItemInput {
    name: String,
    quantity: u32,
    price: f64,
}

impl Order {
    fn from_record(id: u64, record: database::order::Order) -> Self {
        Self {
            id: ID(id.to_string()),
            customer_id: ID(record.customer_id.to_string()),
            amount: record.amount,
            items: record
                .items
                .into_iter()
                .map(|item| OrderItem {
                    name: item.name,
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
            order_date: DateTimeUtc(record.order_date),
        }
    }
}

impl TryFromKeyValue for Order {
    fn try_from_key_value(key: &[u8], value: &[u8]) -> anyhow::Result<Self> {
        let id = parse_key(key)
            .with_context(|| format!("invalid key in database: {key:02x?}"))?;
        let record = bincode::deserialize::<database::order::Order>(value)
            .with_context(|| format!("invalid value in database for key {key:02x?}"))?;
        Ok(Order::from_record(id, record))
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.id.as_str())
    }
}

#[derive(Default)]
pub(crate) struct OrderQuery;

#[Object]
impl OrderQuery {
    async fn orders(
        &self,
        ctx: &Context<'_>,
        customer: Option<ID>,
        after: Option<String>,
        before: Option<String>,
        first: Option<i32>,
        last: Option<i32>,
    ) -> Result<Connection<String, Order, EmptyFields, EmptyFields>> {
        let want = customer
            .as_ref()
            .map(parse_id)
            .transpose()?
            .map(|id| id.to_string());
        query(
            after,
            before,
            first,
            last,
            |after, before, first, last| async move {
                super::load_connection(
                    ctx,
                    |db, start, end| {
                        let want = want.clone();
                        db.orders::<Order>(start, end).filter(move |item| {
                            match (&want, item) {
                                (Some(want), Ok(order)) => order.customer_id.as_str() == want.as_str(),
                                _ => true,
                            }
                        })
                    },
                    after,
                    before,
                    first,
                    last,
                )
            },
        )
        .await
    }

    async fn order(&self, ctx: &Context<'_>, id: ID) -> Result<Order> {
        let db = ctx.data::<Database>()?;
        let id = parse_id(&id)?;
        let record = db
            .order(id)
            .map_err(|e| format!("failed to read database: {e}"))?
            .ok_or("order not found")?;
        Ok(Order::from_record(id, record))
    }
}

#[derive(Default)]
pub(crate) struct OrderMutation;

#[Object]
impl OrderMutation {
    async fn create_order(
        &self,
        ctx: &Context<'_>,
        customer: ID,
        amount: f64,
        #[graphql(default)] items: Vec<OrderItemInput>,
        order_date: Option<DateTimeUtc>,
    ) -> Result<Order> {
        let db = ctx.data::<Database>()?;
        let customer_id = parse_id(&customer)?;
        if amount < 0.0 {
            return Err("order amount cannot be negative".into());
        }
        db.customer(customer_id)
            .map_err(|e| format!("failed to read database: {e}"))?
            .ok_or("customer not found")?;
        let record = database::order::Order {
            customer_id,
            amount,
            items: items
                .into_iter()
                .map(|item| database::order::OrderItem {
                    name: item.name,
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
            order_date: order_date.map_or_else(Timestamp::now, |t| t.0),
        };
        let id = db
            .insert_order(&record)
            .map_err(|e| format!("failed to write database: {e}"))?;
        Ok(Order::from_record(id, record))
    }

    async fn delete_order(&self, ctx: &Context<'_>, id: ID) -> Result<bool> {
        let db = ctx.data::<Database>()?;
        let id = parse_id(&id)?;
        db.delete_order(id)
            .map_err(|e| format!("failed to write database: {e}"))
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use crate::graphql::TestSchema;

    async fn create_customer(schema: &TestSchema, name: &str) -> String {
        let res = schema
            .execute(&format!(
                r#"mutation {{
                    createCustomer(input: {{ name: "{name}", email: "{name}@example.com" }}) {{ id }}
                }}"#
            ))
            .await;
        assert!(res.errors.is_empty(), "{:?}", res.errors);
        res.data.into_json().unwrap()["createCustomer"]["id"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn create_order_requires_existing_customer() {
        let schema = TestSchema::new();
        let res = schema
            .execute(r#"mutation { createOrder(customer: "999", amount: 10) { id } }"#)
            .await;
        assert!(!res.errors.is_empty());
        assert!(res.errors[0].message.contains("customer not found"));
    }

    #[tokio::test]
    async fn create_order_populates_customer() {
        let schema = TestSchema::new();
        let customer_id = create_customer(&schema, "ada").await;

        let res = schema
            .execute(&format!(
                r#"mutation {{
                    createOrder(customer: "{customer_id}", amount: 25.0, items: [
                        {{ name: "widget", quantity: 2, price: 12.5 }}
                    ]) {{
                        id
                        amount
                        customer {{ name email }}
                    }}
                }}"#
            ))
            .await;
        assert!(res.errors.is_empty(), "{:?}", res.errors);
        let data = res.data.into_json().unwrap();
        assert_eq!(data["createOrder"]["amount"], 25.0);
        assert_eq!(data["createOrder"]["customer"]["name"], "ada");
    }

    #[tokio::test]
    async fn orders_filter_by_customer() {
        let schema = TestSchema::new();
        let ada = create_customer(&schema, "ada").await;
        let bob = create_customer(&schema, "bob").await;

        for (customer, amount) in [(&ada, 10.0), (&bob, 20.0), (&ada, 30.0)] {
            let res = schema
                .execute(&format!(
                    r#"mutation {{ createOrder(customer: "{customer}", amount: {amount}) {{ id }} }}"#
                ))
                .await;
            assert!(res.errors.is_empty(), "{:?}", res.errors);
        }

        let res = schema
            .execute(&format!(
                r#"{{ orders(customer: "{ada}") {{ edges {{ node {{ amount }} }} }} }}"#
            ))
            .await;
        let data = res.data.into_json().unwrap();
        let edges = data["orders"]["edges"].as_array().unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0]["node"]["amount"], 10.0);
        assert_eq!(edges[1]["node"]["amount"], 30.0);
    }
}
