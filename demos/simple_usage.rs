use log_tail::{Config, tail_file};
use std::time::Duration;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "app.log".to_string());

    // tail -F from the start of the file, splitting very long lines
    let config = Config {
        location: -1,
        follow: true,
        reopen: true,
        max_line_size: 4096,
        ..Config::default()
    };
    let mut tail = tail_file(&path, config).await?;

    println!("Following {} for ten seconds...", tail.filename().display());

    let deadline = tokio::time::sleep(Duration::from_secs(10));
    tokio::pin!(deadline);

    let mut count = 0;
    loop {
        tokio::select! {
            line = tail.next() => match line {
                Some(line) => {
                    count += 1;
                    println!("[{}] {}", line.time.format("%H:%M:%S%.3f"), line.text());
                }
                None => break,
            },
            _ = &mut deadline => break,
        }
    }

    tail.stop().await?;
    println!("--- {} lines", count);

    Ok(())
}
