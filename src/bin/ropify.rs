#![cfg(feature = "cli")]

use async_trait::async_trait;
use clap::{Arg, ArgMatches, Command};
use log::debug;
use std::error::Error as StdError;
use std::path::PathBuf;
use std::sync::Arc;

use ropify_client::auth::{Credential, RegisterForm, SessionState};
use ropify_client::config::ClientOptions;
use ropify_client::garment::{Camera, CaptureOutcome, GarmentFilter, ImageHandle, CATEGORIES};
use ropify_client::mask::{render_mask, MaskRender};
use ropify_client::store::FileStore;
use ropify_client::Ropify;

type CliResult = Result<(), Box<dyn StdError>>;

/// A camera that always "captures" the file given on the command line
struct FileCamera {
    path: PathBuf,
}

#[async_trait]
impl Camera for FileCamera {
    async fn request_permission(&self) -> bool {
        true
    }

    async fn capture(&self) -> Option<ImageHandle> {
        if self.path.exists() {
            Some(ImageHandle::from_path(&self.path))
        } else {
            None
        }
    }
}

fn cli() -> Command<'static> {
    Command::new("ropify")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Command-line client for the Ropify closet service")
        .subcommand_required(true)
        .arg(
            Arg::new("api_url")
                .long("api-url")
                .env("ROPIFY_API_URL")
                .value_name("URL")
                .help("Base URL of the Ropify backend")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .value_name("FILE")
                .help("File the session is persisted in")
                .takes_value(true)
                .default_value("ropify-session.json"),
        )
        .subcommand(Command::new("restore").about("Show the persisted session"))
        .subcommand(
            Command::new("login")
                .about("Sign in with email and password")
                .arg(Arg::new("email").long("email").takes_value(true).required(true))
                .arg(
                    Arg::new("password")
                        .long("password")
                        .env("ROPIFY_PASSWORD")
                        .takes_value(true)
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("register")
                .about("Create an account and sign in")
                .arg(Arg::new("email").long("email").takes_value(true).required(true))
                .arg(Arg::new("password").long("password").takes_value(true).required(true))
                .arg(Arg::new("confirm").long("confirm").takes_value(true).required(true))
                .arg(Arg::new("username").long("username").takes_value(true).required(true))
                .arg(Arg::new("first_name").long("first-name").takes_value(true).required(true))
                .arg(Arg::new("last_name").long("last-name").takes_value(true).required(true)),
        )
        .subcommand(
            Command::new("oauth-token")
                .about("Exchange a Google access token for a session")
                .arg(Arg::new("token").required(true)),
        )
        .subcommand(Command::new("oauth-url").about("Print the browser login URL"))
        .subcommand(
            Command::new("callback")
                .about("Complete a browser login from its deep-link URL")
                .arg(Arg::new("url").required(true)),
        )
        .subcommand(Command::new("logout").about("Sign out and clear the stored session"))
        .subcommand(
            Command::new("closet")
                .about("List garments")
                .arg(
                    Arg::new("category")
                        .long("category")
                        .takes_value(true)
                        .possible_values(CATEGORIES)
                        .default_value("all"),
                )
                .arg(Arg::new("page").long("page").takes_value(true).default_value("1"))
                .arg(Arg::new("color").long("color").takes_value(true))
                .arg(Arg::new("brand").long("brand").takes_value(true)),
        )
        .subcommand(
            Command::new("capture")
                .about("Upload a photo for analysis")
                .arg(Arg::new("image").required(true)),
        )
        .subcommand(
            Command::new("mask")
                .about("Print the clip path for a normalized polygon")
                .arg(Arg::new("width").required(true))
                .arg(Arg::new("height").required(true))
                .arg(
                    Arg::new("points")
                        .value_name("X,Y")
                        .multiple_values(true),
                ),
        )
}

fn arg(matches: &ArgMatches, name: &str) -> String {
    matches.value_of(name).unwrap_or_default().to_string()
}

async fn print_session(ropify: &Ropify) {
    let session = ropify.session().session().await;
    match session.user() {
        Some(user) => println!(
            "{:?} as {} <{}> ({} {})",
            session.state(),
            user.username,
            user.email,
            user.first_name,
            user.last_name
        ),
        None => println!("{:?}", session.state()),
    }
    println!("route: {}", ropify.session().route().await.path());
}

async fn closet(ropify: &Ropify, matches: &ArgMatches) -> CliResult {
    let closet = ropify.closet().await.ok_or("not signed in")?;

    let mut filter = GarmentFilter::category(&arg(matches, "category"))
        .with_page(arg(matches, "page").parse()?);
    if let Some(color) = matches.value_of("color") {
        filter = filter.with_color(color);
    }
    if let Some(brand) = matches.value_of("brand") {
        filter = filter.with_brand(brand);
    }

    closet.refetch(filter).await?;
    for garment in closet.garments() {
        println!(
            "{}\t{}\t{}\t{}",
            garment.id, garment.category, garment.color, garment.image_url
        );
    }
    Ok(())
}

async fn capture(ropify: &Ropify, path: &str) -> CliResult {
    let closet = ropify.closet().await.ok_or("not signed in")?;
    let camera = FileCamera {
        path: PathBuf::from(path),
    };

    match closet.capture(&camera).await? {
        CaptureOutcome::Canceled => println!("no image at {}", path),
        CaptureOutcome::Analyzed(analysis) => {
            println!(
                "category: {}\ncolor: {}",
                analysis.category,
                analysis.primary_color().unwrap_or("-")
            );
            match render_mask(analysis.bounding_poly.as_deref(), 1.0, 1.0) {
                MaskRender::Masked(path) => println!("mask: {}", path.to_svg_path()),
                MaskRender::Unmasked => println!("mask: none"),
            }
        }
    }
    Ok(())
}

fn mask(matches: &ArgMatches) -> CliResult {
    let width: f64 = arg(matches, "width").parse()?;
    let height: f64 = arg(matches, "height").parse()?;

    let mut points = Vec::new();
    for raw in matches.values_of("points").into_iter().flatten() {
        let (x, y) = raw
            .split_once(',')
            .ok_or_else(|| format!("expected X,Y, got {:?}", raw))?;
        points.push(ropify_client::garment::Point::new(
            x.trim().parse()?,
            y.trim().parse()?,
        ));
    }

    match render_mask(Some(&points), width, height) {
        MaskRender::Masked(path) => println!("{}", path.to_svg_path()),
        MaskRender::Unmasked => println!("unmasked"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> CliResult {
    pretty_env_logger::init();

    let matches = cli().get_matches();
    let (command, sub) = matches.subcommand().ok_or("no command given")?;

    if command == "mask" {
        return mask(sub);
    }

    let store = Arc::new(FileStore::new(arg(&matches, "store")));
    let ropify = Ropify::new_with_options(&arg(&matches, "api_url"), store, ClientOptions::default())?;
    let session = ropify.session();

    let state = session.restore().await;
    debug!("Restored session state {:?}", state);

    match command {
        "restore" => {}
        "login" => {
            session
                .authenticate(Credential::password(&arg(sub, "email"), &arg(sub, "password")))
                .await?;
        }
        "register" => {
            let form = RegisterForm {
                email: arg(sub, "email"),
                password: arg(sub, "password"),
                confirmation: arg(sub, "confirm"),
                username: arg(sub, "username"),
                first_name: arg(sub, "first_name"),
                last_name: arg(sub, "last_name"),
            };
            session.register(form).await?;
        }
        "oauth-token" => {
            session
                .authenticate(Credential::oauth_access_token(&arg(sub, "token")))
                .await?;
        }
        "oauth-url" => {
            println!("{}", ropify.oauth_login_url()?);
            return Ok(());
        }
        "callback" => {
            session
                .authenticate(Credential::from_callback_url(&arg(sub, "url"))?)
                .await?;
        }
        "logout" => session.logout().await?,
        "closet" => return closet(&ropify, sub).await,
        "capture" => return capture(&ropify, &arg(sub, "image")).await,
        other => return Err(format!("unknown command {}", other).into()),
    }

    if session.state().await == SessionState::Unknown {
        return Err("session was never restored".into());
    }
    print_session(&ropify).await;
    Ok(())
}
