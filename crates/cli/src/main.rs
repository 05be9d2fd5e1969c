//! `shotcraft` -- command-line front end for the product photo studio.
//!
//! Every command builds a [`StudioApi`] from the environment (see
//! [`ClientConfig::from_env`]), runs one workspace operation and prints
//! the result. Exits non-zero on any error.
//!
//! # Environment variables
//!
//! | Variable              | Required | Default                     | Description                  |
//! |-----------------------|----------|-----------------------------|------------------------------|
//! | `SHOTCRAFT_API_URL`   | no       | `http://localhost:8000/api` | Backend base URL             |
//! | `SHOTCRAFT_API_TOKEN` | no       | --                          | Bearer token                 |
//! | `POLL_MAX_ATTEMPTS`   | no       | `150`                       | Polls per generation job     |
//! | `POLL_INTERVAL_MS`    | no       | `2500`                      | Delay between polls          |
//! | `AUTH_REFRESH_SECS`   | no       | `300`                       | Auth re-check interval       |
//! | `RUST_LOG`            | no       | `shotcraft=info`            | Log filter                   |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shotcraft_client::api::StudioApi;
use shotcraft_client::backend::{SharedBackend, StudioBackend};
use shotcraft_client::config::ClientConfig;
use shotcraft_client::events::StudioEvent;
use shotcraft_client::search::SearchController;
use shotcraft_client::session::SessionContext;
use shotcraft_client::studio::ProductSession;
use shotcraft_client::submit::create_product;
use shotcraft_core::generation::{
    ImageGroup, RefineRequest, DEFAULT_DENOISE_AMOUNT, DEFAULT_GENERATION_COUNT,
    DEFAULT_NOISE_STRENGTH,
};
use shotcraft_core::product::CreateProductRequest;
use shotcraft_core::search::{SearchRequest, DEFAULT_PAGE, DEFAULT_PAGE_SIZE};
use shotcraft_core::selector;

#[derive(Parser, Debug)]
#[command(name = "shotcraft", version, about = "Generate and curate AI product photos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate new image groups for a product and wait for them
    Generate {
        #[arg(long)]
        product: String,
        #[arg(long)]
        prompt: String,
        #[arg(long, default_value_t = DEFAULT_GENERATION_COUNT)]
        count: u32,
    },
    /// Create a product from already uploaded images
    #[command(name = "create-product")]
    CreateProduct {
        #[arg(long)]
        name: String,
        #[arg(long)]
        org: Option<String>,
        #[arg(long)]
        primary_image_url: String,
        #[arg(long)]
        primary_image_id: Option<String>,
        /// Additional image URL, repeatable
        #[arg(long = "additional-image-url")]
        additional_image_urls: Vec<String>,
    },
    /// Refine one version of an image group
    Refine {
        #[arg(long)]
        product: String,
        #[arg(long)]
        group: String,
        #[arg(long)]
        image: String,
        #[arg(long)]
        prompt: String,
        #[arg(long, default_value_t = DEFAULT_NOISE_STRENGTH)]
        noise: f32,
        #[arg(long, default_value_t = DEFAULT_DENOISE_AMOUNT)]
        denoise: f32,
    },
    /// Pin a version as the group's default image
    #[command(name = "set-default")]
    SetDefault {
        #[arg(long)]
        product: String,
        #[arg(long)]
        group: String,
        #[arg(long)]
        image: String,
    },
    /// Delete an image group
    Delete {
        #[arg(long)]
        product: String,
        #[arg(long)]
        group: String,
    },
    /// Download an image to a file
    Download {
        #[arg(long)]
        image: String,
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Search the organization's image library
    Search {
        /// Defaults to the first organization of the signed-in user
        #[arg(long)]
        org: Option<String>,
        #[arg(long)]
        text: Option<String>,
        /// Hex colour, repeatable
        #[arg(long = "color")]
        colors: Vec<String>,
        #[arg(long = "face")]
        faces: Vec<String>,
        #[arg(long = "product")]
        products: Vec<String>,
        #[arg(long, default_value_t = DEFAULT_PAGE)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u32,
    },
    /// List products of an organization
    Products {
        #[arg(long)]
        org: Option<String>,
    },
    /// List avatars available to an organization
    Avatars {
        #[arg(long)]
        org: Option<String>,
    },
    /// List the signed-in user's organizations
    Orgs,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shotcraft=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env();

    if let Err(e) = run(cli.command, config).await {
        tracing::error!(error = %e, "Command failed");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: ClientConfig) -> anyhow::Result<()> {
    let api = StudioApi::from_config(&config).context("failed to build HTTP client")?;
    tracing::debug!(api_url = %api.api_url(), "Using backend");
    let backend: SharedBackend = Arc::new(api);

    match command {
        Commands::Generate {
            product,
            prompt,
            count,
        } => {
            let _auth = watch_session(&backend, &config).await?;
            let session = ProductSession::new(backend, product, config.poll);
            let mut events = session.subscribe();
            let progress = tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    log_event(&event);
                }
            });

            let outcome = session.generate(&prompt, count).await;
            progress.abort();
            let outcome = outcome?;

            println!("Job {} {}", outcome.job_id, outcome.status);
            for group in session.groups().await {
                print_group(&group);
            }
        }
        Commands::Refine {
            product,
            group,
            image,
            prompt,
            noise,
            denoise,
        } => {
            let _auth = watch_session(&backend, &config).await?;
            let session = ProductSession::new(backend, product, config.poll);
            session.load_recent().await?;
            let request = RefineRequest::new(prompt)
                .with_noise_strength(noise)
                .with_denoise_amount(denoise);
            let refined = session.refine(&group, &image, &request).await?;
            print_group(&refined);
        }
        Commands::CreateProduct {
            name,
            org,
            primary_image_url,
            primary_image_id,
            additional_image_urls,
        } => {
            let org = resolve_organization(&backend, org).await?;
            let mut request = CreateProductRequest::new(name, org, primary_image_url);
            if let Some(id) = primary_image_id {
                request = request.with_primary_image_id(id);
            }
            for url in additional_image_urls {
                request = request.with_additional_image(None, url);
            }
            let product = create_product(backend.as_ref(), &request).await?;
            println!("Created product {}  {}  {:?}", product.id, product.name, product.stage);
        }
        Commands::SetDefault {
            product,
            group,
            image,
        } => {
            let session = ProductSession::new(backend, product, config.poll);
            session.load_recent().await?;
            session.set_default_image(&group, &image).await?;
            println!("Default image of {group} is now {image}");
        }
        Commands::Delete { product, group } => {
            let session = ProductSession::new(backend, product, config.poll);
            session.delete_group(&group).await?;
            println!("Deleted image group {group}");
        }
        Commands::Download { image, out } => {
            let bytes = backend.download_image(&image).await?;
            tokio::fs::write(&out, &bytes)
                .await
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Saved {} bytes to {}", bytes.len(), out.display());
        }
        Commands::Search {
            org,
            text,
            colors,
            faces,
            products,
            page,
            page_size,
        } => {
            let org = resolve_organization(&backend, org).await?;
            let request = SearchRequest::text(text.unwrap_or_default())
                .with_colors(colors)
                .with_faces(faces)
                .with_products(products)
                .with_page(page)
                .with_page_size(page_size);
            let controller = SearchController::new(backend.clone())
                .with_max_attempts(config.search_max_attempts);
            let Some(response) = controller.search(&org, request).await? else {
                bail!("search was cancelled");
            };
            println!(
                "{} results (page {}/{})",
                response.total, response.page, response.total_pages
            );
            for image in &response.images {
                println!(
                    "{}  {}x{}  {}  {}",
                    image.id,
                    image.dimensions.width,
                    image.dimensions.height,
                    image.url,
                    image.caption.as_deref().unwrap_or("")
                );
            }
        }
        Commands::Products { org } => {
            let org = resolve_organization(&backend, org).await?;
            for product in backend.list_products(&org).await? {
                println!("{}  {:<32}  {:?}", product.id, product.name, product.stage);
            }
        }
        Commands::Avatars { org } => {
            let org = resolve_organization(&backend, org).await?;
            for avatar in backend.list_avatars(&org).await? {
                println!(
                    "{}  {:<24}  {:<8}  {}",
                    avatar.id,
                    avatar.name,
                    avatar.gender,
                    avatar.preview_url().unwrap_or("")
                );
            }
        }
        Commands::Orgs => {
            let session = SessionContext::load(backend).await?;
            if !session.is_authenticated().await {
                bail!("not signed in");
            }
            let current = session.current_organization().await.map(|o| o.id);
            for org in session.organizations().await {
                let marker = if current.as_deref() == Some(org.id.as_str()) { "*" } else { " " };
                println!(
                    "{marker} {}  {}  {}",
                    org.id,
                    org.name,
                    org.role.as_deref().unwrap_or("")
                );
            }
        }
    }

    Ok(())
}

/// Session kept fresh for the duration of a long-running command.
async fn watch_session(
    backend: &SharedBackend,
    config: &ClientConfig,
) -> anyhow::Result<Arc<SessionContext>> {
    let session = SessionContext::start(backend.clone(), config.auth_refresh_interval).await?;
    if !session.is_authenticated().await {
        tracing::warn!("Not signed in, the backend may reject requests");
    }
    Ok(session)
}

/// Use the explicit organization, else the signed-in user's current one.
async fn resolve_organization(
    backend: &SharedBackend,
    explicit: Option<String>,
) -> anyhow::Result<String> {
    if let Some(org) = explicit {
        return Ok(org);
    }
    let session = SessionContext::load(backend.clone()).await?;
    match session.current_organization().await {
        Some(org) => Ok(org.id),
        None => bail!("no organization available; pass --org or sign in"),
    }
}

fn print_group(group: &ImageGroup) {
    let current = selector::current_image(group);
    println!(
        "{}  versions={}  current={}",
        group.id,
        group.images.len(),
        current.map_or("-", |image| image.id.as_str())
    );
    for (index, image) in group.images.iter().enumerate() {
        let marker = if current.is_some_and(|c| c.id == image.id) { "*" } else { " " };
        println!(
            "  {marker} v{index} {}  {:?}  {}",
            image.id,
            image.status,
            image.url.as_deref().unwrap_or("")
        );
    }
}

fn log_event(event: &StudioEvent) {
    match event {
        StudioEvent::JobSubmitted {
            job_id,
            placeholders,
        } => tracing::info!(job_id = %job_id, placeholders, "Job submitted"),
        StudioEvent::GroupsUpdated { job_id, groups } => {
            let pending = groups.iter().filter(|g| g.has_pending()).count();
            tracing::info!(job_id = %job_id, groups = groups.len(), pending, "Progress");
        }
        other => tracing::debug!(event = ?other, "Studio event"),
    }
}
