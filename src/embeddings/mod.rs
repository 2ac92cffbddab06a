use std::collections::HashMap;

use async_trait::async_trait;

use crate::utils::files::file_reader;

/// A table of pretrained token vectors with a fixed dimension
pub trait EmbeddingLookup: Send + Sync {
    /// The size of every vector in the table
    fn dimension(&self) -> usize;

    /// Returns the vector for a token, or `None` if the token is out of vocabulary
    fn lookup(&self, token: &str) -> Option<&[f32]>;
}

/// Embeddings which can be loaded from a file
#[async_trait]
pub trait LoadableEmbeddings: EmbeddingLookup {
    /// Load the embeddings
    async fn load(path: &str) -> Result<Self, EmbeddingError>
    where
        Self: std::marker::Sized;
}

/// Word vectors kept in memory, keyed by token
#[derive(Clone, Debug, Default)]
pub struct WordVectors {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl WordVectors {
    /// Creates an empty table for vectors of the given dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
        }
    }

    /// Builds a table from `(token, vector)` pairs
    pub fn from_pairs<I, S>(dimension: usize, pairs: I) -> Result<Self, EmbeddingError>
    where
        I: IntoIterator<Item = (S, Vec<f32>)>,
        S: Into<String>,
    {
        let mut table = Self::new(dimension);

        for (token, vector) in pairs {
            table.insert(token, vector)?;
        }

        Ok(table)
    }

    /// Adds or replaces a token vector
    pub fn insert(
        &mut self,
        token: impl Into<String>,
        vector: Vec<f32>,
    ) -> Result<(), EmbeddingError> {
        let token = token.into();

        if vector.len() != self.dimension {
            return Err(EmbeddingError::Dimension {
                token,
                expected: self.dimension,
                found: vector.len(),
            });
        }

        self.vectors.insert(token, vector);

        Ok(())
    }

    /// Parses the fastText/word2vec text format.
    ///
    /// The first line may be a `<count> <dimension>` header. Without a header,
    /// the dimension is taken from the first vector row.
    pub fn parse<I, S>(lines: I) -> Result<Self, EmbeddingError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = Builder::default();

        for (index, line) in lines.into_iter().enumerate() {
            builder.push_line(index, line.as_ref())?;
        }

        builder.finish()
    }

    /// The number of tokens in the table
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Returns true if the table holds no vectors
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl EmbeddingLookup for WordVectors {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn lookup(&self, token: &str) -> Option<&[f32]> {
        self.vectors.get(token).map(Vec::as_slice)
    }
}

#[async_trait]
impl LoadableEmbeddings for WordVectors {
    async fn load(path: &str) -> Result<Self, EmbeddingError> {
        let mut lines = file_reader(path).await?;
        let mut builder = Builder::default();
        let mut index = 0;

        while let Some(line) = lines.next_line().await? {
            builder.push_line(index, &line)?;
            index += 1;
        }

        let table = builder.finish()?;

        log::info!(
            "Loaded {} word vectors of dimension {} from {}",
            table.len(),
            table.dimension,
            path
        );

        Ok(table)
    }
}

/// Accumulates a [`WordVectors`] table from text rows
#[derive(Default)]
struct Builder {
    table: Option<WordVectors>,
}

impl Builder {
    /// Adds the row at 0-based `index`, which may be the header when it is the first
    fn push_line(&mut self, index: usize, line: &str) -> Result<(), EmbeddingError> {
        let fields: Vec<&str> = line.split_whitespace().collect();

        let Some((token, rest)) = fields.split_first() else {
            return Ok(());
        };

        if index == 0 && rest.len() == 1 {
            if let (Ok(_count), Ok(dimension)) = (token.parse::<usize>(), rest[0].parse::<usize>())
            {
                self.table = Some(WordVectors::new(dimension));
                return Ok(());
            }
        }

        let values = rest
            .iter()
            .map(|value| {
                value.parse::<f32>().map_err(|_| EmbeddingError::Parse {
                    line: index + 1,
                    value: value.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let dimension = values.len();

        self.table
            .get_or_insert_with(|| WordVectors::new(dimension))
            .insert(*token, values)
    }

    fn finish(self) -> Result<WordVectors, EmbeddingError> {
        match self.table {
            Some(table) if table.dimension > 0 => Ok(table),
            _ => Err(EmbeddingError::Empty),
        }
    }
}

/// Embedding Error
#[derive(thiserror::Error, Debug)]
pub enum EmbeddingError {
    /// The embedding source could not be read
    #[error("unable to read embeddings: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be parsed as a number
    #[error("invalid value {value:?} on line {line}")]
    Parse {
        /// 1-based line number
        line: usize,

        /// The offending value
        value: String,
    },

    /// A vector did not match the table dimension
    #[error("vector for {token:?} has {found} values, expected {expected}")]
    Dimension {
        /// The token being inserted
        token: String,

        /// The table dimension
        expected: usize,

        /// The length of the rejected vector
        found: usize,
    },

    /// No vectors were found
    #[error("no word vectors found")]
    Empty,
}
