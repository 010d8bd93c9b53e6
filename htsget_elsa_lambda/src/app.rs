use clap::Parser;
use lambda_http::{Error, Request, run, service_fn};
use log::info;
use std::path::PathBuf;

use htsget_elsa_lib::{config::Config, elsa_endpoint::ElsaEndpoint, s3_instance::S3Instance};

use crate::handler::handle_request;

#[derive(Parser, Debug)]
pub struct LambdaOpts {
    /// Env file to load before reading configuration from the environment
    #[clap(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

/// # Errors
/// Returns error if configuration is incomplete or the lambda runtime fails
pub async fn start_app() -> Result<(), Error> {
    let opts = LambdaOpts::parse();
    let config = Config::init_config(opts.config.as_deref())?;
    let sdk_config = aws_config::load_from_env().await;

    let s3 = S3Instance::new(
        &sdk_config,
        &config.cache_location,
        config.presign_duration(),
    );
    let elsa = ElsaEndpoint::new(&config.elsa_endpoint_authority, s3.clone(), s3.clone())?;
    info!(
        "serving htsget with resolvers from {} cached in {}",
        config.elsa_endpoint_authority,
        s3.cache_bucket()
    );

    let config = &config;
    let elsa = &elsa;
    let s3 = &s3;
    run(service_fn(move |event: Request| async move {
        Ok::<_, Error>(handle_request(config, elsa, s3, &event).await)
    }))
    .await
}
