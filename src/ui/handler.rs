// Wed Jan 15 2026 - Alex

use super::args::Args;
use super::display::DisplayRenderer;
use crate::config::EngineConfig;
use crate::engine::{ImageLoader, Interposer, ManualLoader};
use crate::image::ImageHandle;
use crate::memory::{Address, BinaryMemory, MemoryView};
use crate::rebind::{list_indirect_slots, IndirectSlot, PreviousAddress, RebindReport};
use crate::utils::LoggingUtils;
use anyhow::Context;
use colored::Colorize;
use log::info;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
struct ListOutput<'a> {
    image: &'a ImageHandle,
    slots: &'a [IndirectSlot],
}

#[derive(Serialize)]
struct RebindOutput<'a> {
    reports: &'a [RebindReport],
    previous: Vec<CapturedPrevious>,
}

#[derive(Serialize)]
struct CapturedPrevious {
    symbol: String,
    previous: Option<Address>,
}

pub struct CommandHandler {
    renderer: DisplayRenderer,
}

impl CommandHandler {
    pub fn new() -> Self {
        Self {
            renderer: DisplayRenderer::new(),
        }
    }

    pub fn execute(mut self, args: Args) -> anyhow::Result<()> {
        self.setup_logging(&args)?;
        if args.no_color {
            colored::control::set_override(false);
            self.renderer = DisplayRenderer::new().with_color(false);
        }
        args.validate().map_err(|e| anyhow::anyhow!(e))?;

        let config = match &args.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };

        let memory = Arc::new(
            BinaryMemory::load_at(&args.binary, Address::new(args.base))
                .with_context(|| format!("Failed to map {}", args.binary.display()))?,
        );
        info!("Mapped {} at {}", args.binary.display(), memory.base_address());

        if args.rebind.is_empty() {
            self.handle_list(&args, &memory, &config)
        } else {
            self.handle_rebind(&args, memory, config)
        }
    }

    fn setup_logging(&self, args: &Args) -> anyhow::Result<()> {
        let level = LoggingUtils::level_from_str(&args.log_level)
            .ok_or_else(|| anyhow::anyhow!("Unknown log level: {}", args.log_level))?;
        LoggingUtils::init_logger(level);
        Ok(())
    }

    fn handle_list(&self, args: &Args, memory: &BinaryMemory, config: &EngineConfig) -> anyhow::Result<()> {
        let image = memory.image();
        let slots = list_indirect_slots(memory, &image, config).context("Failed to read symbol pointer slots")?;

        if args.json {
            let output = ListOutput {
                image: &image,
                slots: &slots,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{} {}", "Image".cyan().bold(), image);
            println!("{}", self.renderer.render_slots(&slots));
        }
        Ok(())
    }

    fn handle_rebind(&self, args: &Args, memory: Arc<BinaryMemory>, config: EngineConfig) -> anyhow::Result<()> {
        let loader = Arc::new(ManualLoader::new().with_image(memory.image()));
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let interposer = Interposer::new(
            memory as Arc<dyn MemoryView>,
            loader as Arc<dyn ImageLoader>,
            config,
        )?
        .with_observer(move |report| sink.lock().push(report.clone()));

        let mut captures = Vec::new();
        let requests = args
            .rebind
            .iter()
            .map(|spec| {
                let previous = PreviousAddress::new();
                captures.push((spec.name.clone(), previous.clone()));
                spec.to_substitution().capture_previous(&previous)
            })
            .collect();
        interposer.submit(requests)?;

        let reports = reports.lock().clone();
        if args.json {
            let output = RebindOutput {
                reports: &reports,
                previous: captures
                    .iter()
                    .map(|(symbol, previous)| CapturedPrevious {
                        symbol: symbol.clone(),
                        previous: previous.get(),
                    })
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            for report in &reports {
                println!("{}", self.renderer.render_report(report));
            }
            println!("{}", self.renderer.render_captures(&captures));
        }
        Ok(())
    }
}

impl Default for CommandHandler {
    fn default() -> Self {
        Self::new()
    }
}
