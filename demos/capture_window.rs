use std::time::{Duration, Instant};

use crabeye::prelude::*;
use tracing_subscriber::EnvFilter;

fn parse_window_id(arg: &str) -> Option<u32> {
    match arg.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => arg.parse().ok(),
    }
}

fn main() -> Result<(), CaptureError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let Some(window_id) = std::env::args().nth(1).as_deref().and_then(parse_window_id) else {
        eprintln!("usage: capture_window <window id>");
        std::process::exit(1);
    };

    let mut session = CaptureSession::new(&CaptureConfig::default());
    session.open(WindowHandle(window_id))?;
    println!("capturing window {} at {:?}, stride {}", WindowHandle(window_id), session.size(), session.stride());

    let started = Instant::now();
    let mut frames = 0u32;
    while started.elapsed() < Duration::from_secs(3) {
        session.refresh()?;
        frames += 1;
        std::thread::sleep(Duration::from_millis(33));
    }

    if let Some(frame) = session.frame() {
        match frame.get_bitmap() {
            Ok(FrameBitmap::BgraUnorm8x4(bitmap)) => {
                println!("frame {}: {}x{}, first pixel {:?}", frame.frame_id(), bitmap.width, bitmap.height, bitmap.data.first());
            },
            Ok(_) => println!("frame {}: unexpected bitmap format", frame.frame_id()),
            Err(error) => println!("bitmap error: {}", error),
        }
    }
    println!("{} frames in {:.2?}", frames, started.elapsed());
    session.close();
    Ok(())
}
