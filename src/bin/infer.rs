//! Command line tool to classify texts with a previously trained model

use std::sync::Arc;

use anyhow::anyhow;
use burn_textcnn::{
    embeddings::{EmbeddingLookup, LoadableEmbeddings, WordVectors},
    pipelines::text_classification::{Classifier, ClassifierConfig, Trainer, TrainingConfig},
};
use pico_args::Arguments;

#[cfg(not(feature = "tch"))]
type Backend = burn::backend::Autodiff<burn::backend::NdArray>;

#[cfg(feature = "tch")]
type Backend = burn::backend::Autodiff<burn::backend::LibTorch>;

const HELP: &str = "\
Usage: infer --embeddings PATH --checkpoint DIR TEXT...

Arguments:
  TEXT                 One or more texts to classify

Options:
  -h, --help           Print help
  --embeddings         Word vectors in the fastText/word2vec text format
  --checkpoint         Directory holding a trained model
  -p, --probabilities  Print the probability of every label
";

#[derive(Debug)]
struct Args {
    /// Prints the usage menu
    help: bool,

    /// Print every label probability
    probabilities: bool,

    /// Path to the word vectors
    embeddings: Option<String>,

    /// Path to the checkpoint
    checkpoint: Option<String>,

    /// Texts to classify
    texts: Vec<String>,
}

fn parse_args() -> Result<Args, pico_args::Error> {
    let mut pargs = Arguments::from_env();

    let mut args = Args {
        help: pargs.contains(["-h", "--help"]),
        probabilities: pargs.contains(["-p", "--probabilities"]),
        embeddings: pargs.opt_value_from_str("--embeddings")?,
        checkpoint: pargs.opt_value_from_str("--checkpoint")?,
        texts: Vec::new(),
    };

    while let Some(text) = pargs.opt_free_from_str()? {
        args.texts.push(text);
    }

    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let args = parse_args()?;

    if args.help {
        println!("{}", HELP);
        return Ok(());
    }

    let embeddings = args
        .embeddings
        .ok_or_else(|| anyhow!("Missing required option: --embeddings"))?;
    let checkpoint = args
        .checkpoint
        .ok_or_else(|| anyhow!("Missing required option: --checkpoint"))?;

    if args.texts.is_empty() {
        return Err(anyhow!("Provide at least one text to classify"));
    }

    let embeddings = Arc::new(WordVectors::load(&embeddings).await?);

    // Only the checkpoint location and embeddings matter when restoring
    let config = TrainingConfig::new(
        ClassifierConfig::new().with_embedding_dim(embeddings.dimension()),
    );
    let trainer = Trainer::<Backend>::new(config, embeddings.clone(), &checkpoint, Default::default());
    let mut classifier = Classifier::new(trainer, embeddings, Default::default());

    if !classifier.restore()? {
        return Err(anyhow!("No trained model found at {}", checkpoint));
    }

    for text in &args.texts {
        if args.probabilities {
            let scores = classifier.predict_proba(text)?;
            let scores: Vec<String> = scores
                .iter()
                .map(|(label, p)| format!("{}={:.4}", label, p))
                .collect();

            println!("{}\t{}", text, scores.join(" "));
        } else {
            println!("{}\t{}", text, classifier.predict(text)?);
        }
    }

    Ok(())
}
