use argh::FromArgs;
use reqwest::multipart::{Form, Part};
use std::path::PathBuf;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 10000;

#[derive(FromArgs)]
/// Client for the visual question answering server
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute: "ask", "health" or "status"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Ask(AskCommand),
    Health(HealthCommand),
    Status(StatusCommand),
}

#[derive(FromArgs)]
/// Ask a question about an image
#[argh(subcommand, name = "ask")]
struct AskCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// the question to ask
    #[argh(option, short = 'q')]
    question: String,
}

#[derive(FromArgs)]
/// Check that the server is up
#[argh(subcommand, name = "health")]
struct HealthCommand {}

#[derive(FromArgs)]
/// Check whether the model is busy
#[argh(subcommand, name = "status")]
struct StatusCommand {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    match args.command {
        ClientCommands::Ask(ask_command) => {
            let bytes = tokio::fs::read(&ask_command.image_path).await?;
            let file_name = ask_command
                .image_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());

            let form = Form::new()
                .text("question", ask_command.question)
                .part("image", Part::bytes(bytes).file_name(file_name));

            let response = client
                .post(format!("http://{}/vision-ai", addr))
                .multipart(form)
                .send()
                .await?;

            let status = response.status();
            let result = response.json::<serde_json::Value>().await?;
            println!("Status: {status}");
            println!("Result: {}", serde_json::to_string_pretty(&result)?);
        }
        ClientCommands::Health(_) => {
            let response = client.get(format!("http://{}/", addr)).send().await?;
            println!("Result: {}", response.text().await?);
        }
        ClientCommands::Status(_) => {
            let response = client
                .get(format!("http://{}/status", addr))
                .send()
                .await?;

            let result = response.json::<serde_json::Value>().await?;
            println!("Result: {}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
