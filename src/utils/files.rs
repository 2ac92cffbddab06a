use tokio::{
    fs::File,
    io::{self, AsyncBufReadExt, Lines},
};

/// Lines starting with this prefix are treated as comments in corpus files
pub static COMMENT_PREFIX: &str = "#";

/// Read a file from the given path into a list of strings
pub async fn read_file(path: &str) -> io::Result<Vec<String>> {
    let mut r = file_reader(path).await?;
    let mut lines = Vec::new();

    while let Some(line) = r.next_line().await? {
        lines.push(line);
    }

    Ok(lines)
}

/// Read a training corpus, dropping blank lines and comment lines
pub async fn read_corpus(path: &str) -> io::Result<Vec<String>> {
    let lines = read_file(path).await?;

    Ok(lines
        .into_iter()
        .filter(|line| !line.trim().is_empty() && !line.starts_with(COMMENT_PREFIX))
        .collect())
}

/// Open a file for reading one line at a time
pub async fn file_reader(path: &str) -> io::Result<Lines<io::BufReader<File>>> {
    let f = File::open(path).await?;

    Ok(io::BufReader::new(f).lines())
}
