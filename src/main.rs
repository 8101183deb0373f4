mod database;
mod graphql;
mod llm;
mod query;
mod settings;
mod web;

use std::process::exit;
use std::sync::Arc;

use clap::Parser;

use database::Database;
use llm::{OllamaGenerator, TextGenerator};
use settings::{Args, Settings};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("Problem while loading settings. {error}");
            exit(1);
        }
    };

    let database = match Database::connect(&settings.database.path) {
        Ok(database) => database,
        Err(error) => {
            eprintln!("Problem while opening the database. {error}");
            exit(1);
        }
    };

    let generator: Arc<dyn TextGenerator> = Arc::new(OllamaGenerator::new(&settings.ai.model));
    let schema = graphql::schema(database, generator);
    web::serve(schema, settings.web.address).await;
}
