//! Command line tool to train a classifier, or restore it from its checkpoint, and classify a text

use std::sync::Arc;

use anyhow::anyhow;
use burn::config::Config as _;
use burn_textcnn::{
    datasets::split,
    embeddings::{EmbeddingLookup, LoadableEmbeddings, WordVectors},
    pipelines::text_classification::{
        Classifier, ClassifierConfig, Provenance, Trainer, TrainingConfig,
    },
    utils::files::read_corpus,
};
use pico_args::Arguments;

#[cfg(not(feature = "tch"))]
type Backend = burn::backend::Autodiff<burn::backend::NdArray>;

#[cfg(feature = "tch")]
type Backend = burn::backend::Autodiff<burn::backend::LibTorch>;

const HELP: &str = "\
Usage: train --corpus PATH --embeddings PATH --checkpoint DIR --text TEXT [OPTIONS]

Options:
  -h, --help           Print help
  --corpus             Labeled corpus, one `text__label__label` example per line
  --embeddings         Word vectors in the fastText/word2vec text format
  --checkpoint         Directory to restore the model from, or save it to
  --text               The text to classify once the model is ready
  -c, --config         A training config JSON file (defaults are used otherwise)
  -n, --num-epochs     Number of epochs to train for
  -b, --batch-size     Batch size
  -s, --seed           Seed for splitting, shuffling and initialization
";

#[derive(Debug)]
struct Args {
    corpus: String,
    embeddings: String,
    checkpoint: String,
    text: String,
    config: Option<String>,
    num_epochs: Option<usize>,
    batch_size: Option<usize>,
    seed: Option<u64>,
}

fn required<T: std::str::FromStr>(pargs: &mut Arguments, key: &'static str) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    pargs.value_from_str(key).map_err(|e| match e {
        pico_args::Error::MissingOption(_) => anyhow!("Missing required option: {}", key),
        _ => anyhow!("{}", e),
    })
}

impl Args {
    fn parse() -> anyhow::Result<Option<Self>> {
        let mut pargs = Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            return Ok(None);
        }

        let args = Args {
            corpus: required(&mut pargs, "--corpus")?,
            embeddings: required(&mut pargs, "--embeddings")?,
            checkpoint: required(&mut pargs, "--checkpoint")?,
            text: required(&mut pargs, "--text")?,
            config: pargs.opt_value_from_str(["-c", "--config"])?,
            num_epochs: pargs.opt_value_from_str(["-n", "--num-epochs"])?,
            batch_size: pargs.opt_value_from_str(["-b", "--batch-size"])?,
            seed: pargs.opt_value_from_str(["-s", "--seed"])?,
        };

        Ok(Some(args))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let Some(args) = Args::parse()? else {
        print!("{}", HELP);

        return Ok(());
    };

    let embeddings = Arc::new(WordVectors::load(&args.embeddings).await?);

    let mut config = match &args.config {
        Some(path) => TrainingConfig::load(path)
            .map_err(|e| anyhow!("Unable to load config file: {}", e))?,
        None => TrainingConfig::new(
            ClassifierConfig::new().with_embedding_dim(embeddings.dimension()),
        ),
    };

    if let Some(num_epochs) = args.num_epochs {
        config.num_epochs = num_epochs;
    }

    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }

    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    config.validate()?;

    let lines = read_corpus(&args.corpus).await?;
    let split = split(&lines, config.test_fraction, &config.separator, config.seed)?;

    let device = Default::default();

    let trainer = Trainer::<Backend>::new(
        config,
        embeddings.clone(),
        &args.checkpoint,
        device,
    );
    let mut classifier = Classifier::new(trainer, embeddings, Default::default());

    match classifier.ensure_model(&split)? {
        Provenance::Restored => log::info!("Using the model restored from {}", args.checkpoint),
        Provenance::Trained => log::info!("Using a newly trained model"),
    }

    let label = classifier.predict(&args.text)?;

    println!("{}", label);

    Ok(())
}
