use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Error, Result};
use itertools::Itertools;
use log::*;
use structopt::StructOpt;

use marketspace::model::form::{AdForm, SignInForm, SignUpForm};
use marketspace::model::{AdStatus, FilterOptions, PaymentKey, Product};
use marketspace::{Config, FileStore, HttpCatalog, ImageOutcome, Session, SignIn, SyncError};

type AppSession = Session<HttpCatalog, FileStore>;

#[derive(Debug, StructOpt)]
#[structopt(name = "marketspace", about = "Buy and sell secondhand goods")]
struct Opt {
    /// Config file, defaults to ~/.config/marketspace/config.json
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Backend URL, overrides the config file
    #[structopt(long)]
    api_url: Option<String>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Sign in; the password is read from stdin when not given
    SignIn {
        #[structopt(long)]
        email: String,
        #[structopt(long)]
        password: Option<String>,
    },
    /// Create an account and sign in
    SignUp {
        #[structopt(long)]
        name: String,
        #[structopt(long)]
        email: String,
        #[structopt(long)]
        tel: String,
        #[structopt(long)]
        password: String,
        #[structopt(long)]
        password_confirm: String,
        #[structopt(long, parse(from_os_str))]
        avatar: Option<PathBuf>,
    },
    SignOut,
    /// Exchange the stored refresh token for a new session token
    Refresh,
    /// List other users' ads
    Browse {
        #[structopt(flatten)]
        filter: FilterArgs,
        /// Let the backend apply the filter
        #[structopt(long)]
        remote: bool,
    },
    /// List your own ads
    Mine {
        #[structopt(long, default_value = "all")]
        status: AdStatus,
        /// Show the locally cached copy without contacting the backend
        #[structopt(long)]
        offline: bool,
    },
    Show {
        id: String,
    },
    /// Create and publish an ad
    New {
        #[structopt(flatten)]
        ad: AdArgs,
        #[structopt(long = "image", parse(from_os_str))]
        images: Vec<PathBuf>,
    },
    /// Change an ad; unspecified fields keep their current value
    Edit {
        id: String,
        #[structopt(flatten)]
        ad: AdArgs,
        #[structopt(long = "image", parse(from_os_str))]
        images: Vec<PathBuf>,
        #[structopt(long = "remove-image")]
        remove_images: Vec<String>,
    },
    Enable {
        id: String,
    },
    Disable {
        id: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Debug, StructOpt)]
struct FilterArgs {
    #[structopt(long, conflicts_with = "used")]
    new: bool,
    #[structopt(long)]
    used: bool,
    /// Only ads that accept trades
    #[structopt(long)]
    trade: bool,
    #[structopt(long = "payment")]
    payment_methods: Vec<PaymentKey>,
    #[structopt(long)]
    query: Option<String>,
}

impl FilterArgs {
    fn into_filter(self) -> FilterOptions {
        FilterOptions {
            is_new: condition(self.new, self.used),
            accept_trade: if self.trade { Some(true) } else { None },
            payment_methods: self.payment_methods,
            query: self.query,
        }
    }
}

#[derive(Debug, StructOpt)]
struct AdArgs {
    #[structopt(long)]
    name: Option<String>,
    #[structopt(long)]
    description: Option<String>,
    #[structopt(long, conflicts_with = "used")]
    new: bool,
    #[structopt(long)]
    used: bool,
    /// Price in major units, e.g. 49.90
    #[structopt(long)]
    price: Option<String>,
    #[structopt(long)]
    trade: Option<bool>,
    #[structopt(long = "payment")]
    payment_methods: Vec<PaymentKey>,
}

impl AdArgs {
    fn into_form(self, current: AdForm) -> AdForm {
        AdForm {
            name: self.name.unwrap_or(current.name),
            description: self.description.unwrap_or(current.description),
            is_new: condition(self.new, self.used).or(current.is_new),
            price: self.price.unwrap_or(current.price),
            accept_trade: self.trade.or(current.accept_trade),
            payment_methods: if self.payment_methods.is_empty() {
                current.payment_methods
            } else {
                self.payment_methods
            },
        }
    }
}

fn condition(new: bool, used: bool) -> Option<bool> {
    match (new, used) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

/// Turns a failed action into the one-line notice shown to the user.
fn notice(e: SyncError, fallback: &str) -> Error {
    debug!("{:?}", e);
    Error::msg(e.user_message(fallback))
}

fn report_sign_in(session: &AppSession, signed_in: &SignIn, greeting: &str) {
    println!("{}, {}!", greeting, signed_in.user.first_name());
    if signed_in.mirror_error.is_some() {
        eprintln!("Could not save the session on this device. Sign in again next time.");
    }
    match &signed_in.listings_error {
        Some(e) => eprintln!("{}", e.user_message("Could not load your ads.")),
        None => println!("You have {} active ads.", session.active_count()),
    }
}

fn report_images(images: &ImageOutcome) {
    if let Some(e) = &images.removal_error {
        eprintln!("{}", e.user_message("Could not remove the images."));
    }
    if let Some(e) = &images.error {
        eprintln!("{}", e.user_message("Could not save the images."));
    }
    if images.mirror_error.is_some() {
        eprintln!("The images were saved but the local copy is out of date.");
    }
}

fn read_password() -> Result<String> {
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .with_context(|| "Error reading password from stdin")?;
    Ok(line.trim_end_matches(&['\r', '\n'][..]).to_owned())
}

fn print_products<'a>(products: impl IntoIterator<Item = &'a Product>) {
    for p in products {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            p.id,
            p.name,
            p.price_display(),
            if p.is_new { "new" } else { "used" },
            if p.is_active { "active" } else { "inactive" },
        );
    }
}

fn print_details(session: &AppSession, product: &Product) {
    println!("{} ({})", product.name, product.id);
    println!("{}", product.description);
    println!("Price: {}", product.price_display());
    println!("Condition: {}", if product.is_new { "new" } else { "used" });
    println!("Accepts trade: {}", if product.accept_trade { "yes" } else { "no" });
    println!(
        "Payment: {}",
        product.payment_methods.iter().map(|m| &m.name).join(", ")
    );
    if let Some(owner) = &product.user {
        println!("Seller: {} ({})", owner.name, owner.tel);
    }
    for image in &product.product_images {
        println!("Image: {}", session.api().image_url(&image.path));
    }
    if session.is_own_listing(product) {
        println!("Status: {}", if product.is_active { "active" } else { "inactive" });
    }
}

async fn run(opt: Opt) -> Result<()> {
    let mut config = Config::load(opt.config.as_deref())?;
    if let Some(url) = opt.api_url {
        config.api_url = url;
    }
    debug!("Using {:?}", config);
    let api = HttpCatalog::new(config.api_url.clone(), config.timeout())
        .with_context(|| "Error building HTTP client")?;
    let mut session = Session::new(api, FileStore::new(config.cache_path()?));
    if let Err(e) = session.restore().await {
        warn!("Continuing signed out, saved session unavailable: {}", e);
    }

    match opt.cmd {
        Command::SignIn { email, password } => {
            let password = match password {
                Some(p) => p,
                None => read_password()?,
            };
            let signed_in = session
                .sign_in(&SignInForm { email, password })
                .await
                .map_err(|e| notice(e, "Could not sign in right now. Try again later."))?;
            report_sign_in(&session, &signed_in, "Welcome");
        }
        Command::SignUp {
            name,
            email,
            tel,
            password,
            password_confirm,
            avatar,
        } => {
            let form = SignUpForm {
                name,
                email,
                tel,
                password,
                password_confirm,
                avatar,
            };
            let signed_in = session
                .sign_up(&form)
                .await
                .map_err(|e| notice(e, "Could not create the account. Try again later."))?;
            report_sign_in(&session, &signed_in, "Account created, welcome");
        }
        Command::SignOut => {
            session
                .sign_out()
                .await
                .map_err(|e| notice(e, "Could not sign out."))?;
        }
        Command::Refresh => {
            session
                .renew_token()
                .await
                .map_err(|e| notice(e, "Could not refresh the session. Sign in again."))?;
            println!("Session refreshed, {} active ads.", session.active_count());
        }
        Command::Browse { filter, remote } => {
            let filter = filter.into_filter();
            if remote {
                let products = session
                    .search(&filter)
                    .await
                    .map_err(|e| notice(e, "Could not load the ads."))?;
                print_products(&products);
            } else {
                session
                    .load_products()
                    .await
                    .map_err(|e| notice(e, "Could not load the ads."))?;
                session.apply_filter(filter);
                print_products(session.visible_products());
            }
        }
        Command::Mine { status, offline } => {
            let loaded = if offline {
                session.load_from_cache().await
            } else {
                session.load_own_products().await
            };
            loaded.map_err(|e| notice(e, "Could not load your ads."))?;
            let products = session.own_products_by_status(status);
            println!("{} ads, {} active", products.len(), session.active_count());
            print_products(products);
        }
        Command::Show { id } => {
            let product = session
                .product(&id)
                .await
                .map_err(|e| notice(e, "Could not load the ad."))?;
            print_details(&session, &product);
        }
        Command::New { ad, images } => {
            let form = ad.into_form(AdForm::default());
            let submission = session
                .submit_ad(&form, &images)
                .await
                .map_err(|e| notice(e, "Could not save the ad. Try again later."))?;
            report_images(&submission.images);
            let product = session
                .publish(&submission.product.id)
                .await
                .map_err(|e| notice(e, "Could not publish the ad."))?;
            print_details(&session, &product);
        }
        Command::Edit {
            id,
            ad,
            images,
            remove_images,
        } => {
            let current = session
                .product(&id)
                .await
                .map_err(|e| notice(e, "Could not load the ad."))?;
            let kept = current
                .product_images
                .iter()
                .filter(|i| !remove_images.contains(&i.id))
                .count();
            let form = ad.into_form(AdForm::from_product(&current));
            let edit = session
                .edit_ad(&id, &form, kept, &images, &remove_images)
                .await
                .map_err(|e| notice(e, "Could not save the ad. Try again later."))?;
            report_images(&edit.images);
            if let Some(e) = &edit.publish_error {
                eprintln!("{}", e.user_message("The ad was saved but could not be reloaded."));
            }
            if let Some(product) = &edit.product {
                print_details(&session, product);
            }
        }
        Command::Enable { id } => {
            session
                .set_active_flag(&id, true)
                .await
                .map_err(|e| notice(e, "Could not enable the ad."))?;
        }
        Command::Disable { id } => {
            session
                .set_active_flag(&id, false)
                .await
                .map_err(|e| notice(e, "Could not disable the ad."))?;
        }
        Command::Delete { id } => {
            session
                .remove(&id)
                .await
                .map_err(|e| notice(e, "Could not delete the ad."))?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();
    let opt = Opt::from_args();
    if let Err(e) = run(opt).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
