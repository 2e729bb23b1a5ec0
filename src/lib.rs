#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::case_sensitive_file_extension_comparisons,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_wraps,
    dead_code
)]

use clap::Subcommand;
use serde::{Deserialize, Serialize};

pub mod agent;
pub mod config;
pub mod deploy;
pub mod gateway;
pub mod generator;
pub mod ingest;
pub mod observability;
pub mod pubsub;
pub mod sessions;
pub mod tools;
pub mod util;

pub use config::Config;

/// Session inspection subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionCommands {
    /// Fetch (and implicitly create) a session by id
    #[command(long_about = "\
Fetch a session by id.

Goes through the implicit session proxy, so an unknown id is created \
on the spot. For card-keyed sessions the user id and session id are \
both the card number; --session defaults to --user.

Examples:
  fraudwatch sessions get --user 4200123412341234
  fraudwatch sessions get --user 4200123412341234 --recent 5")]
    Get {
        /// User id (the card number for transaction sessions)
        #[arg(long)]
        user: String,
        /// Session id; defaults to the user id
        #[arg(long)]
        session: Option<String>,
        /// Only show the most recent N events
        #[arg(long)]
        recent: Option<usize>,
    },
    /// List sessions for a user
    List {
        #[arg(long)]
        user: String,
    },
    /// Delete a session
    Delete {
        #[arg(long)]
        user: String,
        /// Session id; defaults to the user id
        #[arg(long)]
        session: Option<String>,
    },
}

impl SessionCommands {
    /// `(user, session)` targeted by this command; `List` has no session.
    pub fn target(&self) -> (&str, Option<&str>) {
        match self {
            Self::Get { user, session, .. } | Self::Delete { user, session } => {
                (user, Some(session.as_deref().unwrap_or(user)))
            }
            Self::List { user } => (user, None),
        }
    }
}
