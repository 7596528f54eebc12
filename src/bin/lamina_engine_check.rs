//! Development/ops smoke-test binary for the storage engine.
//!
//! Builds an [`Engine`](lamina_engine::Engine) from a config file, runs a
//! handful of operations against its configured data directory, and
//! reports what happened. Never listens on a socket — the HTTP gateway
//! is a separate, out-of-scope layer.

use clap::Parser;
use lamina_engine::config::load_config;
use lamina_engine::facade::CopyDirective;
use lamina_engine::model::ChecksumAlgorithm;
use lamina_engine::multipart::CompletedPart;
use lamina_engine::{init_tracing, Engine};
use std::collections::HashMap;
use std::io::Cursor;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "lamina-engine-check", about = "Exercise the storage engine against a config file")]
struct Args {
    /// Path to the engine's YAML configuration file.
    #[arg(long, default_value = "lamina-engine.yaml")]
    config: String,

    /// Bucket name to use for the smoke run.
    #[arg(long, default_value = "lamina-engine-check")]
    bucket: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;
    init_tracing(&config.logging);

    let engine = Engine::new(config)?;
    run_smoke(&engine, &args.bucket).await?;
    Ok(())
}

async fn run_smoke(engine: &Engine, bucket: &str) -> anyhow::Result<()> {
    info!(bucket, "creating bucket");
    match engine.buckets.create(bucket, None).await {
        Ok(_) => {}
        Err(e) if e.code() == "BucketAlreadyExists" => info!(bucket, "bucket already exists, reusing"),
        Err(e) => return Err(e.into()),
    }

    info!(bucket, key = "smoke/hello.txt", "storing object");
    let record = engine
        .objects
        .store(
            bucket,
            "smoke/hello.txt",
            Box::pin(Cursor::new(b"hello from lamina-engine-check".to_vec())),
            "text/plain".to_string(),
            HashMap::new(),
            None,
            None,
            None,
            None,
        )
        .await?;
    info!(etag = %record.etag, size = record.size, "stored");

    let mut body = Vec::new();
    let found = engine
        .objects
        .read(bucket, "smoke/hello.txt", Box::pin(&mut body), None)
        .await?;
    info!(found = found.is_some(), bytes = body.len(), "read back");

    info!("copying object");
    engine
        .objects
        .copy(
            bucket,
            "smoke/hello.txt",
            bucket,
            "smoke/hello-copy.txt",
            CopyDirective::Copy,
        )
        .await?;

    let listing = engine.objects.list(bucket, "smoke/", Some("/"), None, 1000).await?;
    info!(keys = listing.keys.len(), "listed");

    info!("running a tiny multipart upload");
    let upload = engine
        .multipart
        .initiate(
            bucket,
            "smoke/multipart.bin",
            "application/octet-stream".to_string(),
            HashMap::new(),
            Some(ChecksumAlgorithm::Sha256),
        )
        .await?;
    let part = engine
        .multipart
        .store_part(&upload.upload_id, 1, Box::pin(Cursor::new(vec![b'A'; 1024])), None)
        .await?;
    let outcome = engine
        .multipart
        .complete(
            &upload.upload_id,
            vec![CompletedPart {
                part_number: 1,
                expected_etag: part.etag,
            }],
        )
        .await?;
    info!(etag = %outcome.etag, size = outcome.size, "multipart complete");

    info!("cleaning up");
    engine.objects.delete(bucket, "smoke/hello.txt").await?;
    engine.objects.delete(bucket, "smoke/hello-copy.txt").await?;
    engine.objects.delete(bucket, "smoke/multipart.bin").await?;

    info!("smoke run complete");
    Ok(())
}
