use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newschain::auth::{start_token_refresh, AuthGateway, Registration};
use newschain::config::Config;
use newschain::models::Article;
use newschain::navigation::{Navigator, Route};
use newschain::news::NewsRepository;
use newschain::platform::PlatformClient;
use newschain::profile::{initials, ProfileDraft, ProfileRepository};
use newschain::session::SessionStore;
use newschain::topics::{group_by_category, TopicRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newschain=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("NEWSCHAIN_CONFIG").unwrap_or_else(|_| "newschain.toml".to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path))?
        .with_overrides(|key| std::env::var(key).ok());
    info!("Using backend at {}", config.platform.url);

    let store = match &config.auth.session_file {
        Some(path) => SessionStore::with_persistence(path),
        None => SessionStore::new(),
    };
    let client = PlatformClient::new(&config.platform, store.clone())?;
    let gateway = AuthGateway::new(client.clone(), &config.auth);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("register") {
        return register(&args, &gateway, &store, &cancel).await;
    }

    if store.get_current_session(&gateway, &cancel).await.is_none() {
        sign_in_from_env(&gateway, &cancel).await?;
    }

    let navigator = Navigator::mount(&store, Route::Home);
    if navigator.current().flow() != newschain::navigation::Flow::Authenticated {
        anyhow::bail!("Not signed in; set NEWSCHAIN_EMAIL and NEWSCHAIN_PASSWORD");
    }

    // Keep the session fresh while commands run
    let refresh_cancel = cancel.child_token();
    let refresher = tokio::spawn(start_token_refresh(
        gateway.clone(),
        Duration::from_secs(config.auth.refresh_check_secs),
        refresh_cancel.clone(),
    ));

    let result = run(&args, &client, &gateway, &navigator, &cancel).await;

    refresh_cancel.cancel();
    if let Err(e) = refresher.await {
        warn!("Session auto-refresh task failed: {}", e);
    }
    result
}

/// `register <email> <password> <display name…>`
async fn register(
    args: &[String],
    gateway: &AuthGateway,
    store: &SessionStore,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (args.get(1), args.get(2)) else {
        anyhow::bail!("usage: newschain register <email> <password> <display name>");
    };
    let display_name = args.get(3..).map(|rest| rest.join(" ")).unwrap_or_default();

    let navigator = Navigator::mount(store, Route::Register);
    let registration = gateway
        .register(email, password, &display_name, cancel)
        .await?;
    if let Registration::PendingVerification { message, .. } = &registration {
        println!("{}", message);
    }
    let route = navigator.navigate(registration.next_route());
    println!("Next: {}", route);
    Ok(())
}

async fn sign_in_from_env(gateway: &AuthGateway, cancel: &CancellationToken) -> anyhow::Result<()> {
    let (Ok(email), Ok(password)) = (
        std::env::var("NEWSCHAIN_EMAIL"),
        std::env::var("NEWSCHAIN_PASSWORD"),
    ) else {
        warn!("No stored session and no credentials in the environment");
        return Ok(());
    };

    gateway.login(&email, &password, cancel).await?;
    Ok(())
}

async fn run(
    args: &[String],
    client: &PlatformClient,
    gateway: &AuthGateway,
    navigator: &Navigator,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let topics = TopicRepository::new(client.clone());
    let news = NewsRepository::new(client.clone());

    match args.first().map(String::as_str).unwrap_or("feed") {
        "feed" => {
            print_articles(&news.fetch_feed(&topics, cancel).await?);
        }
        "search" => {
            let query = args[1..].join(" ");
            print_articles(&news.search(&query, cancel).await?);
        }
        "article" => {
            let id = args.get(1).context("usage: newschain article <id>")?;
            navigator.navigate(Route::Article(id.clone()));
            match news.get_article(id, cancel).await? {
                Some(article) => {
                    println!("{}\n{} | {}\n", article.title, article.source.name, article.url);
                    println!("{}", article.content);
                }
                None => println!("No article {}", id),
            }
        }
        "refresh" => {
            news.refresh(cancel).await?;
            println!("Refresh requested; run `feed` again shortly for new articles.");
        }
        "topics" => {
            navigator.navigate(Route::Topics);
            let categories = topics.list_categories(cancel).await?;
            let predefined = topics.list_predefined_topics(cancel).await?;
            let subscribed = topics.list_user_topics(cancel).await?;

            for (category, members) in group_by_category(&categories, &predefined) {
                println!("{}", category.name);
                for topic in members {
                    let mark = subscribed
                        .iter()
                        .any(|t| t.predefined_topic_id() == Some(topic.id.as_str()));
                    println!("  [{}] {} ({})", if mark { "x" } else { " " }, topic.name, topic.id);
                }
            }
            for topic in &subscribed {
                if let Some(name) = topic.custom_name() {
                    println!("  [x] {} (custom, {})", name, topic.id);
                }
            }
        }
        "toggle" => {
            let id = args.get(1).context("usage: newschain toggle <topic-id>")?;
            let toggled = topics.toggle_topic(id, cancel).await?;
            println!(
                "{} {}",
                if toggled.is_subscribed() { "Subscribed to" } else { "Unsubscribed from" },
                id
            );
        }
        "add-topic" => {
            let name = args[1..].join(" ");
            let topic = topics.add_custom_topic(&name, cancel).await?;
            println!("Added custom topic {}", topic.custom_name().unwrap_or_default());
        }
        "profile" => {
            navigator.navigate(Route::Profile);
            let profile = ProfileRepository::new(client.clone())
                .get_profile(cancel)
                .await?;
            println!(
                "[{}] {} <{}>",
                initials(profile.display_name()),
                profile.display_name(),
                profile.email.as_deref().unwrap_or_default()
            );
        }
        "remove-topic" => {
            let id = args
                .get(1)
                .context("usage: newschain remove-topic <user-topic-id>")?;
            topics.remove_user_topic(id, cancel).await?;
            println!("Removed {}", id);
        }
        "rename" => {
            navigator.navigate(Route::Profile);
            let profiles = ProfileRepository::new(client.clone());
            let mut draft = ProfileDraft::begin(&profiles.get_profile(cancel).await?);
            draft.set_name(args[1..].join(" "));
            if !draft.can_save() {
                println!("Nothing to save");
                return Ok(());
            }
            let profile = profiles.update_display_name(draft.name(), cancel).await?;
            println!("Display name is now {}", profile.display_name());
        }
        "logout" => {
            gateway.logout(cancel).await?;
            println!("Signed out");
        }
        other => anyhow::bail!("Unknown command: {}", other),
    }

    Ok(())
}

fn print_articles(articles: &[Article]) {
    if articles.is_empty() {
        println!("No articles. Pick some topics with `topics` and `toggle`.");
        return;
    }
    for article in articles {
        println!(
            "{}  [{}] {} ({})",
            article.created_at.format("%Y-%m-%d %H:%M"),
            article.topic,
            article.title,
            article.source.name
        );
    }
}
