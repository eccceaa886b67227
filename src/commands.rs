//! CLI subcommands

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use tokio::sync::broadcast;

use rentsync::api::types::{Credentials, PropertyFilter};
use rentsync::auth::{fingerprint, ExchangeOutcome, OAuthSession, SessionUser, TokenExchange};
use rentsync::notify::Notification;
use rentsync::registry::{mutations, queries};
use rentsync::QueryClient;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Sign in with email and password
  Login {
    #[arg(short, long)]
    email: String,
    #[arg(short, long)]
    password: String,
  },
  /// Forget the stored token
  Logout,
  /// Show the signed-in profile
  Whoami,
  /// Search listings
  Properties {
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    min_price: Option<u32>,
    #[arg(long)]
    max_price: Option<u32>,
    #[arg(long)]
    guests: Option<u32>,
    #[arg(long)]
    page: Option<u32>,
  },
  /// Show one listing
  Property { id: String },
  /// List reviews, optionally for one listing
  Reviews {
    #[arg(long)]
    property: Option<String>,
  },
  /// Average rating of a listing
  Rating { property_id: String },
  /// List blog posts, or show one by slug
  Blogs { slug: Option<String> },
  /// List your bookings
  Bookings,
  /// Add or remove a listing from favorites
  Favorite { property_id: String },
  /// Admin dashboard numbers
  AdminStats,
  /// Exchange an OAuth identity for an API token
  Oauth {
    #[arg(short, long)]
    email: String,
    #[arg(short, long)]
    name: Option<String>,
    #[arg(short, long)]
    image: Option<String>,
  },
  /// Print token changes, including those made by other processes
  WatchToken,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn print_notifications(rx: &mut broadcast::Receiver<Notification>) {
  while let Ok(notification) = rx.try_recv() {
    eprintln!("{}", notification);
  }
}

fn not_signed_in() -> Result<()> {
  Err(eyre!("not signed in; run `rentsync login` first"))
}

pub async fn run(command: Command, client: &QueryClient) -> Result<()> {
  let mut notifications = client.notifications();
  let result = dispatch(command, client).await;
  print_notifications(&mut notifications);
  result
}

async fn dispatch(command: Command, client: &QueryClient) -> Result<()> {
  match command {
    Command::Login { email, password } => {
      let response = client.sign_in(Credentials { email, password }).await?;
      match response.user {
        Some(user) => println!("signed in as {}", user.email),
        None => println!("signed in"),
      }
    }

    Command::Logout => {
      client.sign_out()?;
      println!("signed out");
    }

    Command::Whoami => match client.fetch_query(&queries::profile(), ()).await? {
      Some(profile) => print_json(&*profile)?,
      None => return not_signed_in(),
    },

    Command::Properties {
      location,
      min_price,
      max_price,
      guests,
      page,
    } => {
      let filter = PropertyFilter {
        location,
        min_price,
        max_price,
        guests,
        page,
      };
      if let Some(properties) = client.fetch_query(&queries::properties(), filter).await? {
        for p in properties.iter() {
          println!(
            "{:<12} {:<40} {:<20} {:>8.2}",
            p.id, p.title, p.location, p.price_per_night
          );
        }
      }
    }

    Command::Property { id } => {
      if let Some(property) = client.fetch_query(&queries::property(), id).await? {
        print_json(&*property)?;
      }
    }

    Command::Reviews { property } => {
      let reviews = match property {
        Some(id) => client.fetch_query(&queries::property_reviews(), id).await?,
        None => client.fetch_query(&queries::reviews(), ()).await?,
      };
      if let Some(reviews) = reviews {
        print_json(&*reviews)?;
      }
    }

    Command::Rating { property_id } => {
      let summary = client.property_rating(&property_id).await?;
      println!(
        "{}: {:.1} ({} reviews)",
        property_id, summary.rating, summary.review_count
      );
    }

    Command::Blogs { slug: Some(slug) } => {
      if let Some(blog) = client.fetch_query(&queries::blog(), slug).await? {
        print_json(&*blog)?;
      }
    }

    Command::Blogs { slug: None } => {
      if let Some(blogs) = client.fetch_query(&queries::blogs(), ()).await? {
        for blog in blogs.iter() {
          println!("{:<30} {}", blog.slug, blog.title);
        }
      }
    }

    Command::Bookings => match client.fetch_query(&queries::bookings(), ()).await? {
      Some(bookings) => print_json(&*bookings)?,
      None => return not_signed_in(),
    },

    Command::Favorite { property_id } => {
      if !client.tokens().has_token() {
        return not_signed_in();
      }
      let toggle = client.mutate(&mutations::toggle_favorite(), property_id).await?;
      let verb = if toggle.favorited { "added to" } else { "removed from" };
      println!("{} {} favorites", toggle.property_id, verb);
    }

    Command::AdminStats => match client.fetch_query(&queries::admin_stats(), ()).await? {
      Some(stats) => print_json(&*stats)?,
      None => return not_signed_in(),
    },

    Command::Oauth { email, name, image } => {
      let session = OAuthSession::authenticated(SessionUser {
        email: Some(email),
        image,
        name,
      });
      match TokenExchange::new(client.clone()).handle(&session).await {
        ExchangeOutcome::Exchanged(tag) => println!("token stored ({})", tag),
        ExchangeOutcome::Skipped => println!("already holding a token"),
        ExchangeOutcome::Failed => return Err(eyre!("oauth exchange failed")),
      }
    }

    Command::WatchToken => watch_token(client).await?,
  }

  Ok(())
}

fn describe(token: Option<&str>) -> String {
  match token {
    Some(token) => format!("token {}", fingerprint(token)),
    None => "no token".to_string(),
  }
}

async fn watch_token(client: &QueryClient) -> Result<()> {
  let mut watch = client.tokens().watch();
  println!("{}", describe(watch.current().as_deref()));

  loop {
    tokio::select! {
      token = watch.changed() => println!("{}", describe(token.as_deref())),
      _ = tokio::signal::ctrl_c() => break,
    }
  }
  Ok(())
}
