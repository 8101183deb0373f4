pub(crate) mod campaign;
pub(crate) mod customer;
pub(crate) mod dashboard;
pub(crate) mod order;
pub(crate) mod segment;

use std::fmt::Display;
use std::sync::Arc;

use async_graphql::{
    types::connection::{Connection, Edge, EmptyFields},
    Context, EmptySubscription, InputValueError, InputValueResult, MergedObject, OutputType,
    Result, Scalar, ScalarType, Value, ID,
};
use base64::{engine::general_purpose, Engine as _};
use jiff::Timestamp;

use crate::database::Database;
use crate::llm::TextGenerator;

/// The default page size for connections when neither `first` nor `last` is provided.
const DEFAULT_PAGE_SIZE: usize = 100;

/// A set of queries defined in the schema.
///
/// This is exposed only for [`Schema`], and not used directly.
#[derive(Default, MergedObject)]
pub(crate) struct Query(
    customer::CustomerQuery,
    order::OrderQuery,
    segment::SegmentQuery,
    campaign::CampaignQuery,
    dashboard::DashboardQuery,
);

#[derive(Default, MergedObject)]
pub(crate) struct Mutation(
    customer::CustomerMutation,
    order::OrderMutation,
    segment::SegmentMutation,
    campaign::CampaignMutation,
);

pub(crate) type Schema = async_graphql::Schema<Query, Mutation, EmptySubscription>;

pub(crate) fn schema(database: Database, generator: Arc<dyn TextGenerator>) -> Schema {
    Schema::build(Query::default(), Mutation::default(), EmptySubscription)
        .data(database)
        .data(generator)
        .finish()
}

/// The acting user, as asserted by the external token issuer and forwarded
/// by the web layer in the `x-user-id` header.
pub(crate) struct Actor(pub(crate) Option<String>);

fn actor<'a>(ctx: &Context<'a>) -> Result<&'a str> {
    match ctx.data::<Actor>()?.0.as_deref() {
        Some(user) => Ok(user),
        None => Err("missing x-user-id header".into()),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub(crate) struct DateTimeUtc(pub(crate) Timestamp);

#[Scalar]
impl ScalarType for DateTimeUtc {
    fn parse(value: Value) -> InputValueResult<Self> {
        match &value {
            Value::String(s) => Ok(DateTimeUtc(s.parse()?)),
            _ => Err(InputValueError::expected_type(value)),
        }
    }

    fn to_value(&self) -> Value {
        Value::String(self.0.to_string())
    }
}

fn parse_id(id: &ID) -> Result<u64> {
    id.parse::<u64>()
        .map_err(|_| format!("invalid id: {}", id.as_str()).into())
}

fn connect_cursor<T>(
    select_vec: Vec<T>,
    prev: bool,
    next: bool,
) -> Connection<String, T, EmptyFields, EmptyFields>
where
    T: OutputType + Display,
{
    let mut connection: Connection<String, T, EmptyFields, EmptyFields> =
        Connection::new(prev, next);
    for output in select_vec {
        connection.edges.push(Edge::new(
            general_purpose::STANDARD.encode(format!("{output}")),
            output,
        ));
    }
    connection
}

fn decode_cursor(cursor: &str) -> Result<u64> {
    let bytes = general_purpose::STANDARD.decode(cursor)?;
    String::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| "invalid cursor".into())
}

fn load_connection<N, I>(
    ctx: &Context<'_>,
    iter_builder: impl Fn(&Database, Option<u64>, Option<u64>) -> I,
    after: Option<String>,
    before: Option<String>,
    first: Option<usize>,
    last: Option<usize>,
) -> Result<Connection<String, N, EmptyFields, EmptyFields>>
where
    N: Display + OutputType,
    I: DoubleEndedIterator<Item = anyhow::Result<N>>,
{
    let db = ctx.data::<Database>()?;
    let (nodes, has_previous, has_next) = if let Some(before) = before {
        if after.is_some() {
            return Err("cannot use both `after` and `before`".into());
        }
        if first.is_some() {
            return Err("'before' and 'first' cannot be specified simultaneously".into());
        }
        let last = last.unwrap_or(DEFAULT_PAGE_SIZE);
        let end = decode_cursor(&before)?;
        let iter = iter_builder(db, None, Some(end)).rev();
        let (mut nodes, has_previous) = collect_nodes(iter, last)?;
        nodes.reverse();
        (nodes, has_previous, false)
    } else if let Some(after) = after {
        if last.is_some() {
            return Err("'after' and 'last' cannot be specified simultaneously".into());
        }
        let first = first.unwrap_or(DEFAULT_PAGE_SIZE);
        let start = decode_cursor(&after)?.saturating_add(1);
        let iter = iter_builder(db, Some(start), None);
        let (nodes, has_next) = collect_nodes(iter, first)?;
        (nodes, false, has_next)
    } else if let Some(last) = last {
        if first.is_some() {
            return Err("first and last cannot be used together".into());
        }
        let iter = iter_builder(db, None, None).rev();
        let (mut nodes, has_previous) = collect_nodes(iter, last)?;
        nodes.reverse();
        (nodes, has_previous, false)
    } else {
        let first = first.unwrap_or(DEFAULT_PAGE_SIZE);
        let iter = iter_builder(db, None, None);
        let (nodes, has_next) = collect_nodes(iter, first)?;
        (nodes, false, has_next)
    };
    Ok(connect_cursor(nodes, has_previous, has_next))
}

fn collect_nodes<I, T>(mut iter: I, size: usize) -> Result<(Vec<T>, bool)>
where
    I: Iterator<Item = anyhow::Result<T>>,
{
    let mut nodes = Vec::with_capacity(size);
    let mut has_more = false;
    while let Some(node) = iter.next() {
        let node = node.map_err(|e| format!("failed to read database: {e}"))?;
        nodes.push(node);
        if nodes.len() == size {
            has_more = iter.next().is_some();
            break;
        }
    }
    Ok((nodes, has_more))
}

#[cfg(test)]
pub(crate) struct TestSchema {
    _dir: tempfile::TempDir, // to prevent the data directory from being deleted while the test is running
    pub(crate) db: Database,
    schema: Schema,
}

#[cfg(test)]
impl TestSchema {
    pub(crate) fn new() -> Self {
        Self::with_reply(String::new())
    }

    /// A schema whose text generator always replies with `reply`.
    pub(crate) fn with_reply(reply: String) -> Self {
        let db_dir = tempfile::tempdir().unwrap();
        let db = Database::connect(db_dir.path()).unwrap();
        let schema = schema(db.clone(), Arc::new(StubGenerator(reply)));
        Self {
            _dir: db_dir,
            db,
            schema,
        }
    }

    pub(crate) async fn execute(&self, query: &str) -> async_graphql::Response {
        self.execute_as("test-user", query).await
    }

    pub(crate) async fn execute_as(&self, user: &str, query: &str) -> async_graphql::Response {
        let request: async_graphql::Request = query.into();
        self.schema
            .execute(request.data(Actor(Some(user.to_string()))))
            .await
    }

    /// Executes a request that arrived without an `x-user-id` header.
    pub(crate) async fn execute_anonymous(&self, query: &str) -> async_graphql::Response {
        let request: async_graphql::Request = query.into();
        self.schema.execute(request.data(Actor(None))).await
    }
}

#[cfg(test)]
struct StubGenerator(String);

#[cfg(test)]
#[async_trait::async_trait]
impl TextGenerator for StubGenerator {
    async fn generate(&self, _prompt: &str) -> std::result::Result<String, crate::llm::Error> {
        Ok(self.0.clone())
    }
}
