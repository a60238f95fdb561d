// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use linestream::{
    global_config, level_for_verbosity, setup_local_tracing, setup_tracing, AppError, AppResult,
    LineServerConfig, LineService, StreamReader, GLOBAL_CONFIG,
};
use tokio::runtime;
use tokio_stream::StreamExt;

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// accept connections and print every line they send (default)
    Serve,
    /// print every line of a file
    Read { path: PathBuf },
    /// print the effective configuration
    PrintConfig,
}

fn main() -> AppResult<()> {
    // 加载 .env 文件
    dotenv().ok();

    let commandline: CommandLine = CommandLine::parse();
    let config_path = commandline.conf.as_ref().map_or_else(
        || {
            let mut path = PathBuf::from("./");
            path.push("conf.toml");
            path
        },
        PathBuf::from,
    );
    // note: config_path comes from the command line, so the cell is filled here
    let server_config = LineServerConfig::set_up_config(config_path)?;
    GLOBAL_CONFIG
        .set(server_config)
        .map_err(|_| AppError::IllegalStateError("config already set".to_string()))?;

    let config = global_config();
    match commandline.command.unwrap_or(Command::Serve) {
        Command::PrintConfig => {
            println!("{:#?}", config);
            Ok(())
        }
        Command::Read { path } => {
            setup_local_tracing()?;
            let rt = runtime::Builder::new_current_thread().enable_all().build()?;
            rt.block_on(print_file_lines(path))
        }
        Command::Serve => {
            let _guard = setup_tracing(&config.log, level_for_verbosity(commandline.verbose))?;

            // startup tokio runtime
            let rt = runtime::Builder::new_multi_thread()
                .worker_threads(config.runtime.worker_threads())
                .enable_all()
                .build()?;

            LineService::new().start(&rt)
        }
    }
}

async fn print_file_lines(path: PathBuf) -> AppResult<()> {
    let file = tokio::fs::File::open(&path).await?;
    let mut lines = StreamReader::new(file, &global_config().reader)?.into_line_stream();
    while let Some(line) = lines.next().await {
        println!("read: {}", line?);
    }
    Ok(())
}
