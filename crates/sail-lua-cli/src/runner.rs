use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::query::{run_query, QueryArgs};
use crate::validate::run_validate;

#[derive(Parser)]
#[command(version, name = "sail-lua")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Run a SQL query against a Lua-scripted table")]
    Query {
        #[arg(long, default_value = "t", help = "The table name used in the query")]
        table: String,
        #[arg(
            long,
            help = "The table columns as comma-separated name:type pairs, e.g. id:integer,name:text"
        )]
        columns: String,
        #[arg(long, help = "The Lua script file for the table")]
        script: Option<PathBuf>,
        #[arg(long, help = "Inline Lua code run after the script file")]
        inject: Option<String>,
        #[arg(help = "The SQL statement to run")]
        sql: String,
    },
    #[command(about = "Validate option names for a catalog context")]
    Validate {
        #[arg(help = "The option context: wrapper, server, user-mapping, table, or column")]
        context: String,
        #[arg(help = "The option names to validate")]
        options: Vec<String>,
    },
}

pub fn main(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_from(args);

    match cli.command {
        Command::Query {
            table,
            columns,
            script,
            inject,
            sql,
        } => run_query(QueryArgs {
            table,
            columns,
            script,
            inject,
            sql,
        }),
        Command::Validate { context, options } => run_validate(&context, &options),
    }
}
