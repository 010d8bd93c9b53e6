#![allow(clippy::semicolon_if_nothing_returned)]
use lambda_http::Error;

use htsget_elsa_lambda::app::start_app;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();
    start_app().await
}
