//! CLI tool to run a saved screenshot through the state reader.
//! Usage: cargo run -p tft-vision --features cli --bin analyze_frame -- <screenshot.png> [data_dir] [output_dir]

use std::path::PathBuf;
use tft_vision::{DigitReader, MatchThresholds, StateReader, TemplateSets, ZoneLayout};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <screenshot.png> [data_dir] [output_dir]", args[0]);
        std::process::exit(1);
    }

    let input_path = PathBuf::from(&args[1]);
    let data_dir = args.get(2).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data"));
    let output_dir = args
        .get(3)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./debug_output"));
    let _ = std::fs::create_dir_all(&output_dir);

    println!("Loading image: {}", input_path.display());
    let img = image::open(&input_path)?.to_rgba8();
    println!("Image size: {}x{}", img.width(), img.height());

    let calibration = data_dir.join("calibration.json");
    let layout = if calibration.exists() {
        ZoneLayout::load(&calibration)?
    } else {
        println!("No calibration at {}, using defaults", calibration.display());
        ZoneLayout::default()
    };
    layout.validate()?;

    println!("\n=== Zones ===");
    for (name, region) in layout.zones() {
        println!(
            "{:<16} x={} y={} w={} h={}",
            name, region.x, region.y, region.width, region.height
        );
        let crop = tft_capture::crop_region(&img, &region);
        let _ = crop.save(output_dir.join(format!("{}.png", name)));
    }
    for (i, card) in layout.shop_cards().iter().enumerate() {
        let crop = tft_capture::crop_region(&img, card);
        let _ = crop.save(output_dir.join(format!("shop_card_{}.png", i)));
    }

    let templates = TemplateSets::load(&data_dir.join("templates"))?;
    let digit_reader = DigitReader::new();
    if !digit_reader.is_available() {
        println!("Tesseract not available! Numbers will be unknown.");
    }
    let reader = StateReader::new(layout, MatchThresholds::default(), templates)
        .with_numeric_reader(digit_reader);

    println!("\n=== Observation ===");
    let observation = reader.read(&img);
    println!("{}", serde_json::to_string_pretty(&observation)?);

    println!("\nZone crops saved to: {}", output_dir.display());
    Ok(())
}
