//! 房屋模板目录命令行客户端

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use house_catalog::{
    auth::IdentityProjector,
    clients::{fetch_auth_override, CatalogApiClient, KeycloakClient, UploadFile},
    config::AppConfig,
    models::{InquiryForm, LoginForm, RegistrationForm, TemplateForm},
    services::AuthService,
    session::{SessionEvent, SessionStore},
    storage::FileStorage,
    telemetry,
};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use validator::Validate;

#[derive(Parser)]
#[command(name = "house-catalog", version, about = "House template catalog client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 登录（密码也可通过 CATALOG_PASSWORD 提供）
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long, env = "CATALOG_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// 注册并登录
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long, env = "CATALOG_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// 登出并清空本地存储
    Logout,
    /// 显示当前身份
    Whoami,
    /// 列出模板或查看单个模板
    Templates {
        #[arg(long)]
        id: Option<i64>,
    },
    /// 提交购买咨询
    Inquire {
        #[arg(long)]
        template_id: i64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        message: Option<String>,
    },
    /// 创建模板（需要管理员或经理角色）
    CreateTemplate {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        price: f64,
        #[arg(long)]
        area: f64,
        #[arg(long)]
        floors: u32,
        #[arg(long)]
        rooms: u32,
        /// 附件路径，可重复
        #[arg(long = "file")]
        files: Vec<PathBuf>,
    },
    /// 删除模板（需要管理员或经理角色）
    DeleteTemplate {
        #[arg(long)]
        id: i64,
    },
    /// 保持会话：周期刷新令牌直到 Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 按优先级加载：.env.local > .env
    dotenv::from_filename(".env.local").ok();
    dotenv::dotenv().ok();

    let mut config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    telemetry::init_telemetry(&config.logging);

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()?;

    if let Some(remote) = fetch_auth_override(&http, &config.api.origin).await {
        config.apply_auth_override(remote);
    }

    let storage = Arc::new(FileStorage::open(&config.session.storage_path)?);
    let endpoint = Arc::new(KeycloakClient::with_client(
        http.clone(),
        config.identity.token_endpoint(),
        config.identity.client_id.clone(),
    ));

    let session = Arc::new(
        SessionStore::new(storage, endpoint.clone(), IdentityProjector::from_config(&config))
            .with_refresh_interval(config.refresh_interval()),
    );
    session.initialize();

    let api = CatalogApiClient::with_client(http, config.api.base_url.clone(), session.clone());
    let auth = AuthService::new(endpoint, session.clone());

    match cli.command {
        Command::Login { username, password } => {
            auth.sign_in(&LoginForm { username, password })
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            print_identity(&session);
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let form = RegistrationForm {
                username,
                email,
                password_confirmation: password.clone(),
                password,
                first_name: None,
                last_name: None,
            };
            auth.register_and_sign_in(&api, &form)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            print_identity(&session);
        }
        Command::Logout => {
            session.logout();
            println!("Signed out");
        }
        Command::Whoami => print_identity(&session),
        Command::Templates { id: Some(id) } => {
            let template = api.get_template(id).await?;
            println!("{}", serde_json::to_string_pretty(&template)?);
        }
        Command::Templates { id: None } => {
            for template in api.list_templates().await? {
                println!(
                    "#{:<5} {:<40} {:>8.1} m²  {} floor(s)  {:>12.0}",
                    template.id, template.title, template.area, template.floors, template.price
                );
            }
        }
        Command::Inquire {
            template_id,
            name,
            email,
            phone,
            message,
        } => {
            let form = InquiryForm {
                template_id,
                name,
                email,
                phone,
                message,
            };
            form.validate()?;
            let created = api.create_application(&form.to_request()).await?;
            println!("Inquiry #{} submitted", created.id);
        }
        Command::CreateTemplate {
            title,
            description,
            price,
            area,
            floors,
            rooms,
            files,
        } => {
            require_privileged(&session)?;
            let form = TemplateForm {
                title,
                description,
                price,
                area,
                floors,
                rooms,
            };
            form.validate()?;

            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                uploads.push(UploadFile::from_path(path).await?);
            }

            let created = api.create_template(&form.to_payload(), uploads).await?;
            println!("Template #{} created", created.id);
        }
        Command::DeleteTemplate { id } => {
            require_privileged(&session)?;
            api.delete_template(id).await?;
            println!("Template #{} deleted", id);
        }
        Command::Watch => watch(&session).await,
    }

    Ok(())
}

fn print_identity(session: &SessionStore) {
    match session.current_identity() {
        Some(identity) => {
            println!("Signed in as {}", identity.display_name);
            if !identity.email.is_empty() {
                println!("Email: {}", identity.email);
            }
            let roles: Vec<&str> = identity.roles.iter().map(String::as_str).collect();
            println!("Roles: {}", roles.join(", "));
            println!("Administrator: {}", if identity.is_privileged { "yes" } else { "no" });
            if let Some(expires) = session.credential().and_then(|c| c.expires_at_utc()) {
                println!("Access token expires at {}", expires.to_rfc3339());
            }
        }
        None => println!("Not signed in"),
    }
}

fn require_privileged(session: &SessionStore) -> anyhow::Result<()> {
    match session.current_identity() {
        Some(identity) if identity.is_privileged => Ok(()),
        Some(_) => anyhow::bail!("This action requires an administrator or manager role"),
        None => anyhow::bail!("Please sign in first"),
    }
}

async fn watch(session: &SessionStore) {
    if !session.is_authenticated() {
        println!("Not signed in");
        return;
    }

    let mut events = session.events();
    session.start_auto_refresh().await;
    tracing::info!("Keeping session alive, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, stopping");
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::LoggedOut { reason }) => {
                    println!("Session ended ({:?})", reason);
                    break;
                }
                Ok(event) => tracing::info!(?event, "Session event"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Missed session events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    session.stop_auto_refresh().await;
}
