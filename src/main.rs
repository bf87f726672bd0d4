mod cache;
mod config;
mod http;
mod logging;
mod worker;

#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use cache::{CacheStorage, MemoryStorage, SqliteStorage};
use http::{Destination, Mode, Network, Request, ReqwestNetwork, Response};
use worker::{FetchOutcome, Interceptor, WorkerState};

#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(about = "An offline-caching fetch interceptor for web app shells")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./shellcache.yaml or $XDG_CONFIG_HOME/shellcache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Keep stores in memory only; nothing survives the run
  #[arg(long, global = true)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pre-populate the current version's store with the asset manifest
  Install,
  /// Delete the stores of every other version
  Activate,
  /// Install, then activate when the new version skips waiting
  Deploy,
  /// Fetch a URL through the interceptor and write the body to stdout
  Fetch {
    /// Absolute URL, or relative to base_url
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    #[arg(short, long, value_enum, default_value_t = Destination::Empty)]
    destination: Destination,
    #[arg(short, long, value_enum, default_value_t = Mode::Cors)]
    mode: Mode,
    /// Shorthand for --mode navigate --destination document
    #[arg(long, conflicts_with_all = ["mode", "destination"])]
    navigate: bool,
    /// Print status line and headers before the body
    #[arg(short, long)]
    include_headers: bool,
  },
  /// List stores, marking the current version
  Stores,
  /// List the entries of a store (default: current version)
  Entries { store: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _guard = logging::init(&config::Config::data_dir()?.join("logs"))?;

  let storage: Arc<dyn CacheStorage> = if args.ephemeral {
    Arc::new(MemoryStorage::new())
  } else {
    Arc::new(SqliteStorage::open(&config.database_path()?)?)
  };
  let network: Arc<dyn Network> = Arc::new(ReqwestNetwork::new(
    &config.base_url()?,
    config.timeout(),
  )?);
  let interceptor = Interceptor::new(config.worker_config()?, storage.clone(), network.clone());

  match args.command {
    Command::Install => {
      report_install(&interceptor, interceptor.install().await?)?;
    }
    Command::Activate => {
      if interceptor.resume()? != WorkerState::Installed {
        return Err(eyre!(
          "Version {} is not installed; run `shellcache install` first",
          interceptor.version()
        ));
      }
      let deleted = interceptor.activate().await?;
      report_activation(&interceptor, &deleted)?;
    }
    Command::Deploy => {
      report_install(&interceptor, interceptor.install().await?)?;
      if interceptor.skip_waiting()? {
        let deleted = interceptor.activate().await?;
        report_activation(&interceptor, &deleted)?;
      }
    }
    Command::Fetch {
      url,
      method,
      destination,
      mode,
      navigate,
      include_headers,
    } => {
      let url = config.resolve(&url)?;
      let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;
      let request = if navigate {
        Request::navigate(url)
      } else {
        Request::new(method, url)
          .with_destination(destination)
          .with_mode(mode)
      };

      let outcome = interceptor.fetch(&request).await;
      // Background cache writes must land before the runtime shuts down
      interceptor.flush().await;

      let response = match outcome? {
        FetchOutcome::Passthrough => network.issue(&request).await?,
        FetchOutcome::Resolved(result) => {
          info!(url = %request.url, source = %result.source, "Resolved");
          result.data
        }
        FetchOutcome::Unresolved => {
          return Err(eyre!(
            "No response for {}: network unavailable and nothing cached",
            request.url
          ));
        }
      };

      write_response(&response, include_headers)?;
    }
    Command::Stores => {
      for name in storage.names()? {
        let marker = if name == interceptor.version() { "*" } else { " " };
        println!("{} {}", marker, name);
      }
    }
    Command::Entries { store } => {
      let store = store.unwrap_or_else(|| interceptor.version().to_string());
      for entry in storage.entries(&store)? {
        println!(
          "{}\t{}\t{}",
          entry.status,
          entry.cached_at.format("%Y-%m-%d %H:%M:%S"),
          entry.url
        );
      }
    }
  }

  Ok(())
}

fn report_install(interceptor: &Interceptor, count: usize) -> Result<()> {
  let takeover = if interceptor.skip_waiting()? {
    "takes over immediately"
  } else {
    "waiting for old clients"
  };
  println!(
    "{} {} ({} assets); {}",
    capitalize(&interceptor.state()?.to_string()),
    interceptor.version(),
    count,
    takeover
  );
  Ok(())
}

fn report_activation(interceptor: &Interceptor, deleted: &[String]) -> Result<()> {
  let removed = if deleted.is_empty() {
    "no old stores".to_string()
  } else {
    format!("removed {}", deleted.join(", "))
  };
  let clients = if interceptor.clients_claimed()? {
    "clients claimed"
  } else {
    "clients unclaimed"
  };
  println!(
    "{} {}; {}; {}",
    capitalize(&interceptor.state()?.to_string()),
    interceptor.version(),
    removed,
    clients
  );
  Ok(())
}

fn capitalize(s: &str) -> String {
  let mut chars = s.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

fn write_response(response: &Response, include_headers: bool) -> Result<()> {
  let mut stdout = std::io::stdout().lock();

  if include_headers {
    writeln!(stdout, "HTTP {} {}", response.status, response.status_text)?;
    for (name, value) in &response.headers {
      writeln!(stdout, "{}: {}", name, value)?;
    }
    writeln!(stdout)?;
  } else if let Some(content_type) = response.header("content-type") {
    info!(content_type, "Writing body");
  }

  stdout.write_all(&response.body)?;
  stdout.flush()?;
  Ok(())
}
