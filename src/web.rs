use std::convert::Infallible;
use std::net::SocketAddr;

use async_graphql_warp::GraphQLResponse;
use tracing::info;
use warp::Filter;

use crate::graphql::{Actor, Schema};

/// Serves the GraphQL API. Identity is asserted upstream by the external
/// token issuer; this layer only forwards the `x-user-id` header it set.
pub(crate) async fn serve(schema: Schema, addr: SocketAddr) {
    let graphql = warp::path("graphql")
        .and(warp::post())
        .and(warp::header::optional::<String>("x-user-id"))
        .and(async_graphql_warp::graphql(schema))
        .and_then(
            |user: Option<String>, (schema, request): (Schema, async_graphql::Request)| async move {
                let request = request.data(Actor(user));
                Ok::<_, Infallible>(GraphQLResponse::from(schema.execute(request).await))
            },
        );

    info!("listening on {addr}");
    warp::serve(graphql).run(addr).await;
}
