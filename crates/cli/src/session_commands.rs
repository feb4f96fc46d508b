use {
    anyhow::{Context, Result},
    clap::Subcommand,
    serde_json::Value,
    stint_sessions::SessionManager,
};

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Create a session and print its token.
    Create {
        /// Session data as JSON.
        #[arg(long)]
        data: Option<String>,
    },
    /// Print a valid session's data.
    Get { token: String },
    /// Replace a session's data and renew it.
    Update {
        token: String,
        /// New session data as JSON. Omit to clear.
        #[arg(long)]
        data: Option<String>,
    },
    /// Renew a session's expiry.
    Renew { token: String },
    /// Remove a session.
    Remove { token: String },
    /// Print the number of stored sessions, expired ones included.
    Count,
}

pub async fn handle_session(action: SessionAction, manager: &SessionManager) -> Result<()> {
    match action {
        SessionAction::Create { data } => {
            let data = parse_data(data.as_deref())?;
            let token = manager.create_session(data.as_ref()).await?;
            println!("{token}");
        },
        SessionAction::Get { token } => {
            let data = manager.retrieve_session::<Value>(&token).await?;
            println!("{}", render(data.as_ref())?);
        },
        SessionAction::Update { token, data } => {
            let data = parse_data(data.as_deref())?;
            manager.update_session(&token, data).await?;
            println!("updated");
        },
        SessionAction::Renew { token } => {
            manager.renew_session(&token).await?;
            println!("renewed");
        },
        SessionAction::Remove { token } => {
            manager.remove_session(&token).await?;
            println!("removed");
        },
        SessionAction::Count => {
            println!("{}", manager.count_sessions().await?);
        },
    }
    Ok(())
}

fn parse_data(raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|s| serde_json::from_str(s).context("--data must be valid JSON"))
        .transpose()
}

fn render(data: Option<&Value>) -> Result<String> {
    match data {
        Some(v) => Ok(serde_json::to_string_pretty(v)?),
        None => Ok("null".to_string()),
    }
}
