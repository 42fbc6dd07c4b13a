use clap::{Parser, Subcommand};

/// This is an auditing and tallying program for hash-chained election ledgers.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Verifies a public ballots export and counts it.
    Tally {
        /// (file path) The file containing the contest configuration, in JSON format.
        /// For more information about the file format, read the manual of the ballot_ledger crate.
        #[clap(short, long, value_parser)]
        config: String,
        /// (file path) A reference file containing the outcome of an election in JSON format. If provided,
        /// ballotctl will check that the tabulated output matches the reference.
        #[clap(short, long, value_parser)]
        reference: Option<String>,
        /// (file path, 'stdout' or empty) If specified, the summary of the election will be written in JSON
        /// format to the given location. Setting this option overrides the output directory of the config.
        #[clap(short, long, value_parser)]
        out: Option<String>,
    },
    /// Recomputes every link of the chain in a public ballots export.
    VerifyChain {
        /// (file path) The public ballots export, in JSON format.
        #[clap(short, long, value_parser)]
        ballots: String,
    },
    /// Checks a voter receipt against a public ballots export.
    VerifyReceipt {
        /// (file path) The public ballots export, in JSON format.
        #[clap(short, long, value_parser)]
        ballots: String,
        #[clap(long, value_parser)]
        ballot_hash: String,
        #[clap(long, value_parser)]
        nonce: String,
        #[clap(long, value_parser)]
        previous_chain_hash: String,
        #[clap(long, value_parser)]
        chain_hash: String,
    },
    /// Runs a complete election in memory with concurrent voters.
    Simulate {
        #[clap(long, value_parser, default_value_t = 100)]
        voters: u32,
        #[clap(long, value_parser, default_value_t = 4)]
        candidates: u32,
        #[clap(long, value_parser, default_value_t = 2)]
        seats: u32,
        /// (number, optional) Seed for the generated rankings. Random if not given.
        #[clap(long, value_parser)]
        seed: Option<u64>,
        /// (default 8) Number of threads casting ballots at the same time.
        #[clap(long, value_parser, default_value_t = 8)]
        threads: usize,
        /// (directory, optional) Where to write ballots.json, contest.json and summary.json.
        #[clap(short, long, value_parser)]
        out: Option<String>,
    },
}
