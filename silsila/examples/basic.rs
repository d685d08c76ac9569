//! Basic example of the Silsila DI container.

use std::sync::Arc;

use silsila::prelude::*;

// === Define your traits and types ===

trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}

struct Config {
    database_url: String,
}

struct Database {
    url: String,
    logger: Arc<dyn Logger>,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("Results from {}", self.url)
    }
}

struct UserRepository {
    db: Arc<Database>,
}

impl UserRepository {
    fn find_user(&self, id: u64) -> String {
        self.db.query(&format!("SELECT * FROM users WHERE id = {id}"))
    }
}

struct UserService {
    repo: Arc<UserRepository>,
    logger: Arc<dyn Logger>,
}

impl UserService {
    fn get_user(&self, id: u64) -> String {
        self.logger.log(&format!("Getting user {id}"));
        self.repo.find_user(id)
    }
}

fn main() -> Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::fmt()
        .with_env_filter("silsila=debug")
        .init();

    let container = Container::new("app");

    // Config - pre-built value
    container.register(
        "config",
        Provider::value(Config {
            database_url: "postgres://localhost/myapp".to_string(),
        }),
    )?;

    // Logger - singleton
    container.register(
        "logger",
        Provider::factory(|_, _| Ok(Arc::new(ConsoleLogger) as Arc<dyn Logger>))
            .with_lifecycle(Lifecycle::Singleton),
    )?;

    // Database - singleton, depends on config + logger
    container.register(
        "database",
        Provider::factory(|container, _| {
            let config: Arc<Config> = container.resolve("config")?;
            let logger: Arc<Arc<dyn Logger>> = container.resolve("logger")?;
            Ok(Database {
                url: config.database_url.clone(),
                logger: (*logger).clone(),
            })
        })
        .with_lifecycle(Lifecycle::Singleton),
    )?;

    // UserRepository - one per resolution tree
    container.register(
        "user-repository",
        Provider::factory(|container, _| {
            let db: Arc<Database> = container.resolve("database")?;
            Ok(UserRepository { db })
        })
        .with_lifecycle(Lifecycle::Resolution),
    )?;

    // UserService - transient, new on every resolve
    container.register(
        "user-service",
        Provider::factory(|container, _| {
            let repo: Arc<UserRepository> = container.resolve("user-repository")?;
            let logger: Arc<Arc<dyn Logger>> = container.resolve("logger")?;
            Ok(UserService {
                repo,
                logger: (*logger).clone(),
            })
        }),
    )?;

    // A local middleware observing every resolution on this container.
    container.use_middleware(Middleware::new("timing", |params, next| {
        let identifier = params.identifier.clone();
        let started = std::time::Instant::now();
        let result = next.call(params);
        println!("[timing] {} took {:?}", identifier, started.elapsed());
        result
    }))?;

    println!("Container ready: {container:?}");

    let service: Arc<UserService> = container.resolve("user-service")?;
    println!("{}", service.get_user(42));

    // A child container overrides the logger without touching the parent.
    let child = Container::with_parent("test", &container);
    child.register(
        "logger",
        Provider::factory(|_, _| {
            struct QuietLogger;
            impl Logger for QuietLogger {
                fn log(&self, _: &str) {}
            }
            Ok(Arc::new(QuietLogger) as Arc<dyn Logger>)
        })
        .with_lifecycle(Lifecycle::Singleton),
    )?;
    let quiet: Arc<UserService> = child.resolve("user-service")?;
    println!("{}", quiet.get_user(7));

    container.dispose();
    Ok(())
}
