use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tabled::{Table, Tabled};

use scene_novel_engine::{
    strip_markup, DirBackend, EnginePhase, PersistenceStore, SceneEngine, SessionStart, Settings,
    Story, StoryRaw, UiView,
};
use snengine_assets::{preload_manifest, FileFetcher, ResourceCache};

#[derive(Parser)]
#[command(author, version, about = "Scene Novel Engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a story JSON file and report dangling references.
    Validate { story: PathBuf },
    /// Compile a story JSON file into binary form.
    Compile {
        story: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Emit the JSON Schema of the authored story format.
    Schema {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the critical preload set derived from a story.
    Manifest {
        story: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Play a story in the terminal.
    Play {
        story: PathBuf,
        /// Directory for saves, settings, and achievements.
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Root directory to preload assets from.
        #[arg(long)]
        assets_root: Option<PathBuf>,
        /// Resume the persisted save instead of starting fresh.
        #[arg(long, default_value_t = false)]
        resume: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate { story } => validate_story(&story),
        Command::Compile { story, output } => compile_story(&story, &output),
        Command::Schema { output } => emit_schema(output.as_deref()),
        Command::Manifest { story, output } => emit_manifest(&story, output.as_deref()),
        Command::Play {
            story,
            data_dir,
            assets_root,
            resume,
        } => play(&story, data_dir.as_deref(), assets_root.as_deref(), resume),
    }
}

fn load_story(path: &Path) -> Result<Story> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let story = StoryRaw::from_json(&raw).context("parse story")?;
    story.compile().context("compile story")
}

fn validate_story(path: &Path) -> Result<()> {
    let story = load_story(path)?;
    println!(
        "{}: {} scenes, {} scored",
        path.display(),
        story.len(),
        story.main_scene_count()
    );
    let problems = story.dangling_references();
    if problems.is_empty() {
        println!("no dangling references");
        return Ok(());
    }
    for problem in &problems {
        println!("warning: {problem}");
    }
    anyhow::bail!("{} dangling reference(s)", problems.len());
}

fn compile_story(path: &Path, output: &Path) -> Result<()> {
    let story = load_story(path)?;
    let bytes = story.to_binary().context("encode story")?;
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, bytes).with_context(|| format!("write {}", output.display()))?;
    Ok(())
}

fn emit_schema(output: Option<&Path>) -> Result<()> {
    let schema = StoryRaw::json_schema_string().context("build schema")?;
    match output {
        Some(path) => fs::write(path, schema).with_context(|| format!("write {}", path.display()))?,
        None => println!("{schema}"),
    }
    Ok(())
}

fn emit_manifest(path: &Path, output: Option<&Path>) -> Result<()> {
    let story = load_story(path)?;
    let manifest = preload_manifest(&story);
    let json = serde_json::to_string_pretty(&manifest)?;
    match output {
        Some(path) => fs::write(path, json).with_context(|| format!("write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Situation")]
    situation: String,
    #[tabled(rename = "Choice")]
    choice: String,
    #[tabled(rename = "Status")]
    status: &'static str,
    #[tabled(rename = "Consequence")]
    consequence: String,
}

fn play(
    story_path: &Path,
    data_dir: Option<&Path>,
    assets_root: Option<&Path>,
    resume: bool,
) -> Result<()> {
    let story = load_story(story_path)?;

    if let Some(root) = assets_root {
        let manifest = preload_manifest(&story);
        let mut cache = ResourceCache::new(Box::new(FileFetcher::new(root)));
        cache.request_many(&manifest);
        cache.wait_settled(Duration::from_secs(30));
        let stats = cache.stats();
        eprintln!(
            "preloaded {} assets ({} failed) from {}",
            stats.loaded,
            stats.failed,
            root.display()
        );
    }

    let (settings, store) = match data_dir {
        Some(dir) => {
            let store = PersistenceStore::new(Box::new(DirBackend::new(dir)));
            (Settings::load(&store), Some(store))
        }
        None => (Settings::default(), None),
    };
    let mut engine = SceneEngine::new(story, settings);
    if let Some(store) = store {
        engine = engine.with_store(store);
    }

    engine.start(if resume {
        SessionStart::Continue
    } else {
        SessionStart::New
    });

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    loop {
        // Headless host: fast-forward all timed effects before rendering.
        engine.tick(Duration::from_secs(60));
        render(&engine);
        for notice in engine.drain_notices() {
            println!("  * {}", notice.message());
        }
        for unlocked in engine.drain_achievement_notifications() {
            println!("  * achievement unlocked: {} {}", unlocked.icon, unlocked.title);
        }
        if matches!(UiView::project(&engine), UiView::FinalVideo { .. }) {
            break;
        }

        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        engine.user_gesture();
        match line.trim() {
            "" => engine.advance(),
            "q" | "quit" => break,
            "s" | "save" => engine.save_game(),
            "h" | "history" => {
                for entry in engine.open_history() {
                    match &entry.speaker {
                        Some(speaker) => println!("  {speaker}: {}", strip_markup(&entry.text)),
                        None => println!("  {}", strip_markup(&entry.text)),
                    }
                }
            }
            "?" | "hint" => engine.request_hint(),
            other => match other.parse::<usize>() {
                Ok(number) if number >= 1 => engine.select_choice(number - 1),
                _ => println!("  (enter to continue, a number to choose, ? for a hint, q to quit)"),
            },
        }
    }

    if engine.phase() == EnginePhase::EndingDisplay {
        println!("the story is over — thanks for playing");
    }
    Ok(())
}

fn render(engine: &SceneEngine) {
    match UiView::project(engine) {
        UiView::Blank | UiView::Transitioning => {}
        UiView::Dialogue {
            location,
            speaker,
            text,
            ..
        } => {
            println!("\n[{location}]");
            match speaker {
                Some(speaker) => println!("{speaker}: {}", strip_markup(&text)),
                None => println!("{}", strip_markup(&text)),
            }
        }
        UiView::ChoicePrompt {
            location,
            speaker,
            prompt,
            options,
            hint_available,
        } => {
            println!("\n[{location}]");
            if let Some(speaker) = speaker {
                println!("{speaker}: {}", strip_markup(&prompt));
            } else {
                println!("{}", strip_markup(&prompt));
            }
            for (index, option) in options.iter().enumerate() {
                println!("  {}. {}", index + 1, strip_markup(option));
            }
            if hint_available {
                println!("  ?. ask for advice");
            }
        }
        UiView::Consequence { text } => {
            println!("\nOutcome: {}", strip_markup(&text));
        }
        UiView::EndingReport { report, options } => {
            println!();
            if let Some(preamble) = &report.preamble {
                println!("{}", strip_markup(preamble));
            }
            let rows: Vec<ReportRow> = report
                .rows
                .iter()
                .map(|row| ReportRow {
                    position: row.position,
                    situation: row.scene_label.clone(),
                    choice: row.choice_label.clone(),
                    status: if row.was_correct { "CORRECT" } else { "WRONG" },
                    consequence: strip_markup(&row.consequence_text),
                })
                .collect();
            println!("{}", Table::new(rows));
            println!("{}", report.summary());
            print_options(&options);
        }
        UiView::EndingNarrative { lines, options } => {
            println!();
            for line in &lines {
                match &line.speaker {
                    Some(speaker) => println!("{speaker}: {}", strip_markup(&line.text)),
                    None => println!("{}", strip_markup(&line.text)),
                }
            }
            print_options(&options);
        }
        UiView::FinalVideo { closing_text } => {
            println!();
            if let Some(text) = closing_text {
                println!("{}", strip_markup(&text));
            }
            println!("(roll the closing video)");
        }
    }
}

fn print_options(options: &[String]) {
    for (index, option) in options.iter().enumerate() {
        println!("  {}. {}", index + 1, strip_markup(option));
    }
}
