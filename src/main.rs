// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;

use callrhythm::audio::{BeatAnchor, BeatClock};
use callrhythm::config::Settings;
use callrhythm::control::ControlMessage;
use callrhythm::render::{render_file, RenderOptions};
use callrhythm::util::{filename_display, minutes_seconds, seconds};
use clap::{crate_version, Parser, Subcommand};
use tracing::error;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Beat-aligned padding and time stretching for call audio."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs a WAV file through the engines, block by block, and writes the result.
    Render {
        /// The WAV file to process.
        input: PathBuf,
        /// Where to write the 32-bit float result.
        output: PathBuf,
        /// The settings file. Defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Rhythm track tempo. Enables beat alignment.
        #[arg(short, long)]
        tempo: Option<f64>,
        /// Time of one beat of the rhythm track, in seconds.
        #[arg(short, long, default_value_t = 0.0)]
        anchor: f64,
        /// Stretch ratio, clamped to [0.5, 2.0].
        #[arg(short, long)]
        stretch: Option<f64>,
        /// Disables beat alignment.
        #[arg(long)]
        no_beat_sync: bool,
        /// Disables time stretching.
        #[arg(long)]
        no_stretch: bool,
    },
    /// Loads a settings file and prints the resolved engine parameters.
    CheckConfig {
        /// The settings file.
        path: PathBuf,
    },
    /// Prints where an instant falls within the beat grid.
    Clock {
        /// Rhythm track tempo.
        #[arg(short, long)]
        tempo: f64,
        /// Time of one beat, in seconds.
        #[arg(short, long, default_value_t = 0.0)]
        anchor: f64,
        /// The instant to query, in seconds.
        #[arg(long)]
        at: f64,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result = run(cli.command);
    if let Err(e) = &result {
        error!(err = e.as_ref(), "Command failed");
    }
    result
}

fn run(command: Commands) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Render {
            input,
            output,
            config,
            tempo,
            anchor,
            stretch,
            no_beat_sync,
            no_stretch,
        } => {
            let mut settings = match config {
                Some(path) => Settings::load(&path)?,
                None => Settings::default(),
            };
            settings.disable(no_beat_sync, no_stretch);

            let mut messages = Vec::new();
            if let Some(tempo_bpm) = tempo {
                messages.push(ControlMessage::BeatTiming {
                    tempo_bpm,
                    anchor_time: anchor,
                });
            }
            if let Some(value) = stretch {
                messages.push(ControlMessage::StretchRatio { value });
            }

            let stats = render_file(&input, &output, &RenderOptions { settings, messages })?;
            println!(
                "Rendered {} ({} channels, {} Hz, {}) to {}.",
                filename_display(&input),
                stats.channels,
                stats.sample_rate,
                minutes_seconds(seconds(stats.frames, stats.sample_rate)),
                filename_display(&output)
            );
        }
        Commands::CheckConfig { path } => {
            let settings = Settings::load(&path)?;
            println!("Sample rate: {} Hz", settings.sample_rate());
            println!("Block size: {} frames", settings.block_size());
            println!("Control queue: {} messages", settings.control_capacity());

            let beat_sync = settings.beat_sync();
            if beat_sync.enabled() {
                println!("Beat sync: {:#?}", beat_sync.params()?);
            } else {
                println!("Beat sync: disabled");
            }
            let stretch = settings.stretch();
            if stretch.enabled() {
                println!("Stretch: {:#?}", stretch.params()?);
            } else {
                println!("Stretch: disabled");
            }
        }
        Commands::Clock { tempo, anchor, at } => {
            let clock = BeatClock::new(Some(BeatAnchor::new(tempo, anchor)));
            match clock.phase(at) {
                Some(phase) => {
                    println!("Beat length: {:.4}s", clock.beat_duration().unwrap_or(0.0));
                    println!("Phase: {:.4}", phase);
                    println!("Time to next beat: {:.4}s", clock.time_to_next_beat(at));
                }
                None => return Err(format!("tempo {} does not give a usable beat", tempo).into()),
            }
        }
    }

    Ok(())
}
