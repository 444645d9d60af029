use crabeye::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let windows = match list_visible_windows(&CaptureConfig::default()) {
        Ok(windows) => windows,
        Err(error) => {
            eprintln!("Error retrieving window list: {}", error);
            std::process::exit(1);
        }
    };
    if windows.is_empty() {
        println!("No windows found.");
        return;
    }
    println!("Available windows:");
    for window in windows {
        let size = window.size();
        println!("  {} {:>5}x{:<5} {}", window.handle(), size.width, size.height, window.title());
    }
}
