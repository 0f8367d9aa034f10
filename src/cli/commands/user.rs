use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::services::UserService;
use crate::types::Role;

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "Create an active user")]
    Create {
        #[arg(long, help = "Email address")]
        email: String,
        #[arg(long, help = "Full name")]
        name: String,
        #[arg(long, help = "ADMIN, ENGINEER, TECHNICAL_MANAGER or PROJECT_MANAGER")]
        role: Role,
        #[arg(long, help = "Initial password")]
        password: String,
    },
}

pub async fn handle(cmd: UserCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        UserCommands::Create { email, name, role, password } => {
            let user = UserService::new()
                .await?
                .create(&email, &name, role, &password)
                .await?;

            output_success(
                output_format,
                &format!("Created {} ({})", user.email, user.role),
                Some(json!({ "id": user.id, "email": user.email, "role": user.role })),
            )
        }
    }
}
