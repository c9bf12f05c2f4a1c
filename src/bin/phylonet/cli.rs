use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// A simple command line tool to manipulate phylogenetic trees and networks
#[derive(Parser, Debug)]
pub struct Args {
    #[command(subcommand)]
    /// The command to execute
    pub command: Commands,

    /// Increase logging verbosity (-v: debug, -vv: trace).
    /// The RUST_LOG environment variable takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Skip trees explicitly marked as unrooted with [&U]
    #[arg(long, global = true)]
    pub rooted_only: bool,
}

/// The available commands in the `phylonet` tool
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Get statistics about the trees of newick or nexus files
    Stats {
        /// Input files
        trees: Vec<PathBuf>,
    },
    /// Reroot trees on the branch above a leaf
    Reroot {
        /// Input newick or nexus file
        tree: PathBuf,
        /// Label of the leaf below the new root
        leaf: String,
        /// Fraction of the branch kept between the new root and the leaf
        #[arg(short, long)]
        prop: Option<f64>,
        /// File to save the trees to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Sort children of every node by ascending number of leaves
    Ladderise {
        /// Input newick or nexus file
        tree: PathBuf,
        /// File to save the trees to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Output the clade below the most recent common ancestor of some leaves
    Mrca {
        /// Input newick or nexus file
        tree: PathBuf,
        /// Labels of the leaves
        leaves: Vec<String>,
        /// File to save the trees to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Draw trees in the terminal
    Print {
        /// Input newick or nexus file
        tree: PathBuf,
        /// Show every field of the nodes
        #[arg(short, long)]
        debug: bool,
    },
    /// Generate random tree(s)
    Generate {
        /// Number of tips in the generated tree
        #[arg(short, long, default_value_t = 20)]
        tips: usize,

        /// Generate uniform branch lengths
        #[arg(short, long)]
        branch_lengths: bool,

        /// Generate a caterpillar tree
        #[arg(short, long)]
        caterpillar: bool,

        /// Output file (directory if generating multiple trees)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of trees to generate
        #[arg(short = 'n', long)]
        trees: Option<usize>,
    },
    /// Generate shell completion scripts
    Completion {
        /// The shell to generate the completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
