use prospect_chat::{
    dataset::{CsvDataset, DatasetConfig, TableSource},
    filter::{FilterCriteria, SearchOutcome},
    init_tracing,
    oracle::{GroqClient, OracleConfig},
    orchestrator::{Orchestrator, Session},
    sanitize::parse_arguments,
    serve,
};
use std::{
    env,
    io::{self, Write},
    sync::Arc,
};
use tokio::io::{AsyncBufReadExt, BufReader};

const USAGE: &str = "Available commands: chat, serve, search <json-arguments>, inspect-data";

#[derive(Debug)]
enum Command {
    Chat,
    Serve,
    Search(String),
    InspectData,
}

impl Command {
    fn from_args() -> Result<Self, String> {
        let args: Vec<String> = env::args().collect();

        let Some(command) = args.get(1) else {
            return Ok(Command::Chat);
        };

        match command.as_str() {
            "chat" => Ok(Command::Chat),
            "serve" => Ok(Command::Serve),
            "search" => Ok(Command::Search(
                args.get(2).cloned().unwrap_or_else(|| "{}".to_string()),
            )),
            "inspect-data" => Ok(Command::InspectData),
            cmd => Err(format!("Unknown command: {}. {}", cmd, USAGE)),
        }
    }

    fn default_log_level(&self) -> &'static str {
        match self {
            Command::Serve => "info",
            _ => "warn",
        }
    }
}

#[tokio::main]
async fn main() {
    let command = match Command::from_args() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    init_tracing(command.default_log_level());

    let dataset = CsvDataset::new(DatasetConfig::from_env());

    let result = match command {
        Command::Chat => chat(dataset).await,
        Command::Serve => {
            println!("Starting server...");
            serve(Arc::new(dataset)).await
        }
        Command::Search(arguments) => {
            let outcome = SearchOutcome::from_arguments(&dataset, &parse_arguments(&arguments));
            println!("{}", outcome.to_wire());
            Ok(())
        }
        Command::InspectData => inspect_data(&dataset),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn read_api_key() -> anyhow::Result<Option<String>> {
    if let Some(key) = OracleConfig::api_key_from_env() {
        return Ok(Some(key));
    }
    print!("Groq API key: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let key = line.trim();
    Ok((!key.is_empty()).then(|| key.to_string()))
}

async fn chat(dataset: CsvDataset) -> anyhow::Result<()> {
    let Some(api_key) = read_api_key()? else {
        println!("Please add your Groq API key to continue (set GROQ_API_KEY or enter it at the prompt).");
        return Ok(());
    };

    let config = OracleConfig::from_env(api_key);
    let timeout = config.timeout;
    let orchestrator = Orchestrator::new(GroqClient::new(config)?, Arc::new(dataset), timeout);
    let mut session = Session::new();

    println!("Swedish Company Prospecting Chatbot");
    println!("Ask me to find companies based on size, turnover, location, and more! (type 'exit' to quit)\n");
    for message in session.messages() {
        if let Some(text) = message.visible_text() {
            println!("{}: {}\n", message.role(), text);
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        print!("assistant: ");
        io::stdout().flush()?;
        let reply = orchestrator
            .respond(&mut session, input, |fragment| {
                print!("{}", fragment);
                let _ = io::stdout().flush();
            })
            .await;
        if !reply.was_streamed() {
            print!("{}", reply.text);
        }
        println!("\n");
    }
    Ok(())
}

fn inspect_data(dataset: &CsvDataset) -> anyhow::Result<()> {
    println!("Inspecting {}...", dataset.path().display());
    let table = dataset.load()?;

    println!("\nColumns:");
    for header in table.headers() {
        println!("  {}", header);
    }
    println!("\nRow count: {}", table.len());

    let SearchOutcome::Found(sample) = SearchOutcome::run(&table, &FilterCriteria::default()) else {
        return Ok(());
    };
    println!("\nFirst rows:");
    println!("{}", serde_json::to_string_pretty(&sample)?);
    Ok(())
}
