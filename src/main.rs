use std::process;

use clap::{Parser, Subcommand, ValueHint};
use log::{debug, error, info, LevelFilter};

use deeload::{
    config::Config,
    downloader::{extract_id, BatchReport, Downloader},
    error::{Error, Result},
    track::TrackId,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when built in release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    ///
    /// Ensure that this file is kept secure and not shared publicly, as
    /// it contains sensitive information that can grant access to your
    /// Deezer account.
    #[arg(
        short,
        long,
        value_name = "FILE",
        value_hint = ValueHint::FilePath,
        env = "DEELOAD_CONFIG",
        default_value_t = String::from("config.toml")
    )]
    config_file: String,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Download whatever a Deezer URL points at (track, album or playlist)
    Url {
        /// Track, album or playlist URL
        url: String,
    },

    /// Download a single track
    Track {
        /// Track URL or id
        track: String,
    },

    /// Download an album with its cover
    Album {
        /// Album URL or id
        album: String,
    },

    /// Download a playlist with its M3U index
    Playlist {
        /// Playlist URL or id
        playlist: String,
    },

    /// Download a user's favorite tracks
    Favorites {
        /// User id; defaults to the signed-in user
        user_id: Option<u64>,
    },

    /// Download all saved albums of the signed-in user
    Albums,

    /// Download all playlists of the signed-in user
    Playlists,

    /// Download every album of one artist
    Artist {
        /// Artist id
        artist_id: u64,
    },

    /// Download the discographies of all favorite artists
    FavoriteArtists {
        /// User id; defaults to the signed-in user
        user_id: Option<u64>,
    },

    /// Download favorites, saved albums and playlists in one go
    All {
        /// User id; defaults to the signed-in user
        user_id: Option<u64>,
    },
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence
/// from highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
fn init_logger(args: &Args) {
    let mut logger = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if args.quiet || args.verbose > 0 {
        let level = match args.verbose {
            // `quiet` and `verbose` are mutually exclusive, so zero
            // `verbose` here means quiet mode.
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Raise our own level only; external crates stay at the default.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Runs the selected operation to completion.
async fn run(args: Args) -> Result<BatchReport> {
    let config = Config::from_file(&args.config_file)?;
    let mut downloader = Downloader::new(config)?;
    downloader.login().await?;

    match args.command {
        Command::Url { url } => downloader.download_url(&url).await,
        Command::Track { track } => {
            let id = extract_id(&track)?;
            let id =
                TrackId::new(id).ok_or_else(|| Error::Input("track id must not be zero".into()))?;
            downloader.download_track(id).await
        }
        Command::Album { album } => {
            let id = extract_id(&album)?;
            downloader.download_album(id).await
        }
        Command::Playlist { playlist } => {
            let id = extract_id(&playlist)?;
            downloader.download_playlist(id).await
        }
        Command::Favorites { user_id } => downloader.download_favorites(user_id).await,
        Command::Albums => downloader.download_all_albums().await,
        Command::Playlists => downloader.download_all_playlists().await,
        Command::Artist { artist_id } => downloader.download_artist(artist_id).await,
        Command::FavoriteArtists { user_id } => {
            downloader.download_favorite_artists(user_id).await
        }
        Command::All { user_id } => downloader.download_all(user_id).await,
    }
}

/// Main entry point of the application.
#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(&args);

    // Parsed arguments first, so a bug report shows what was asked for.
    debug!("Command {args:#?}");

    info!(
        "starting {}/{}; {BUILD_PROFILE}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    match run(args).await {
        Ok(report) => {
            info!(
                "done: {} track(s) in the library, {} failed",
                report.completed, report.failed
            );
            if report.failed > 0 {
                process::exit(2);
            }
        }
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    }
}
