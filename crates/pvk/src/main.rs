use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use pvk::{ClientConfig, HttpTransport, Session, User, UserCourses};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about = "Sign up for PVK courses from the command line")]
struct Cli {
    /// JSON config file; missing fields keep their defaults.
    #[arg(long, env = "PVK_CONFIG")]
    config: Option<PathBuf>,

    /// API token of the logged-in user.
    #[arg(long, env = "PVK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// ETH account name of the logged-in user.
    #[arg(long, env = "PVK_NETHZ")]
    nethz: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show selected courses and signups.
    List,
    /// Select a course, unless it overlaps with one already chosen.
    Select {
        /// Course id.
        course: String,
    },
    /// Remove a selection.
    Deselect {
        /// Selection id.
        selection: String,
    },
    /// Turn all selections into signups.
    Reserve,
    /// Give up a signup.
    Free {
        /// Signup id.
        signup: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pvk=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ClientConfig::load_from_file(path)
            .map_err(|err| anyhow!("{err}"))
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ClientConfig::default(),
    }
    .with_env_overrides();

    let session = match (cli.nethz, cli.token) {
        (Some(identifier), Some(token)) => Session::new(
            User {
                identifier,
                name: None,
            },
            token,
        ),
        _ => bail!("PVK_NETHZ and PVK_TOKEN must be set"),
    };
    let session = Arc::new(session);

    let transport = HttpTransport::new(&config, session.clone())
        .context("failed to build HTTP client")?;
    let courses = UserCourses::new(Arc::new(transport), session, &config);

    info!(api_url = %config.api_url, "Loading courses");
    courses.refresh().await?;

    match cli.command {
        Command::List => {
            courses.load_catalog().await?;
            print_courses(&courses);
        }
        Command::Select { course } => {
            courses.load_catalog().await?;
            let selection = courses.select(&course).await?;
            println!("selected {} ({})", course, selection.id.unwrap_or_default());
        }
        Command::Deselect { selection } => {
            courses.deselect(&selection).await?;
            println!("removed selection {selection}");
        }
        Command::Reserve => {
            let signups = courses.reserve().await?;
            for signup in signups {
                println!("{} {}", signup.course, signup.status);
            }
        }
        Command::Free { signup } => {
            courses.free(&signup).await?;
            println!("freed signup {signup}");
        }
    }

    Ok(())
}

fn print_courses(courses: &UserCourses) {
    let title = |course_id: &str| {
        courses
            .courses()
            .get(course_id)
            .and_then(|course| courses.lecture(&course))
            .map(|lecture| lecture.title)
            .unwrap_or_else(|| course_id.to_string())
    };

    println!("Selected:");
    for selection in courses.selected() {
        println!(
            "  {:<26} {}",
            selection.id.as_deref().unwrap_or("-"),
            title(&selection.course)
        );
    }

    for (label, signups) in [
        ("Waiting", courses.waiting()),
        ("Reserved", courses.reserved()),
        ("Accepted", courses.accepted()),
    ] {
        println!("{label}:");
        for signup in signups {
            println!(
                "  {:<26} {}",
                signup.id.as_deref().unwrap_or("-"),
                title(&signup.course)
            );
        }
    }
}
