//! CLI subcommand handlers.

use crate::{Commands, ConfigAction};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use visage_core::audio;
use visage_core::config::render_config;
use visage_core::gateway::{GatewayServer, run_gateway};
use visage_core::{LanguageTag, Orchestrator, PipelineOutcome, Utterance, VisageConfig};

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port } => handle_serve(workspace, host, port).await,
        Commands::Say {
            text,
            language,
            audio_dir,
        } => handle_say(workspace, text, language, audio_dir.as_deref()).await,
        Commands::Detect { text, scores } => handle_detect(workspace, &text, scores),
        Commands::Transcribe {
            file,
            mime,
            language,
        } => handle_transcribe(workspace, &file, mime, language).await,
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn load(workspace: &Path) -> anyhow::Result<VisageConfig> {
    let config = visage_core::load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
    Ok(config)
}

fn parse_language(language: Option<&str>) -> anyhow::Result<Option<LanguageTag>> {
    match language {
        None => Ok(None),
        Some(name) if name.eq_ignore_ascii_case("auto") => Ok(None),
        Some(name) => LanguageTag::from_name(name)
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("Unsupported language: {}", name)),
    }
}

async fn handle_serve(
    workspace: &Path,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = load(workspace)?;
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }

    let orchestrator = Orchestrator::from_config(&config);
    let gateway = Arc::new(GatewayServer::new(config.gateway.clone(), orchestrator));

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        trigger.cancel();
    });

    println!(
        "Visage gateway listening on http://{}:{}",
        config.gateway.host, config.gateway.port
    );
    run_gateway(gateway, shutdown).await?;
    Ok(())
}

async fn handle_say(
    workspace: &Path,
    text: String,
    language: Option<String>,
    audio_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let config = load(workspace)?;
    let requested = parse_language(language.as_deref())?;
    let orchestrator = Orchestrator::from_config(&config);

    let outcome = orchestrator
        .process(Utterance::text(text).with_language(requested))
        .await?;

    if let Some(dir) = audio_dir {
        std::fs::create_dir_all(dir)?;
        for (i, message) in outcome.messages.iter().enumerate() {
            if let Some(audio) = &message.audio {
                let path = dir.join(format!("message_{i}.mp3"));
                tokio::fs::write(&path, audio).await?;
                eprintln!("Wrote {}", path.display());
            }
        }
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&outcome_json(&outcome, audio_dir.is_none()))?
    );
    Ok(())
}

/// Render an outcome for the terminal. Audio is replaced by its size
/// unless `include_audio` is set.
fn outcome_json(outcome: &PipelineOutcome, include_audio: bool) -> Value {
    let messages: Vec<Value> = outcome
        .messages
        .iter()
        .map(|message| {
            let mut value = json!(message);
            if !include_audio
                && let (Some(obj), Some(audio)) = (value.as_object_mut(), &message.audio)
            {
                obj.insert("audio".into(), json!(format!("<{} bytes>", audio.len())));
            }
            value
        })
        .collect();

    json!({
        "messages": messages,
        "language": outcome.language,
        "transcription": outcome.transcription,
        "degraded": outcome.degraded,
        "states": outcome.states,
    })
}

fn handle_detect(workspace: &Path, text: &str, scores: bool) -> anyhow::Result<()> {
    let config = load(workspace)?;
    let identifier = visage_core::LanguageIdentifier::from_config(&config.language);
    let tag = identifier.identify(text);
    println!("{} ({})", tag.code(), tag.display_name());

    if scores {
        for (language, score) in identifier.scores(text) {
            println!("  {:<4} {}", language.code(), score);
        }
    }
    Ok(())
}

async fn handle_transcribe(
    workspace: &Path,
    file: &Path,
    mime: Option<String>,
    language: Option<String>,
) -> anyhow::Result<()> {
    let config = load(workspace)?;
    let requested = parse_language(language.as_deref())?;
    let orchestrator = Orchestrator::from_config(&config);
    let transcriber = orchestrator.transcriber().ok_or_else(|| {
        anyhow::anyhow!(
            "Transcription is not configured (set {})",
            config.transcription.api_key_env
        )
    })?;

    let bytes = tokio::fs::read(file).await?;
    let mime = mime.unwrap_or_else(|| {
        let extension = file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        audio::mime_for_extension(extension).to_string()
    });

    let transcript = transcriber
        .transcribe(bytes.into(), Some(&mime), requested)
        .await?;
    println!("{}", serde_json::to_string_pretty(&transcript)?);
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load(workspace)?;
            print!("{}", render_config(&config)?);
            Ok(())
        }
        ConfigAction::Init => {
            let config_dir = workspace.join(".visage");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            std::fs::write(&config_path, render_config(&VisageConfig::default())?)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use visage_core::{Animation, FacialExpression, PipelineState, ReplyMessage};

    #[test]
    fn test_parse_language() {
        assert_eq!(parse_language(None).unwrap(), None);
        assert_eq!(parse_language(Some("auto")).unwrap(), None);
        assert_eq!(
            parse_language(Some("Spanish")).unwrap(),
            Some(LanguageTag::Es)
        );
        assert!(parse_language(Some("klingon")).is_err());
    }

    #[test]
    fn test_outcome_json_hides_audio() {
        let mut message = ReplyMessage::new(
            "Hi",
            FacialExpression::Smile,
            Animation::TalkingOne,
            LanguageTag::En,
        );
        message.audio = Some(vec![0u8; 42].into());
        let outcome = PipelineOutcome {
            messages: vec![message],
            language: LanguageTag::En,
            transcription: None,
            states: vec![PipelineState::Received, PipelineState::Delivered],
            degraded: false,
        };

        let value = outcome_json(&outcome, false);
        assert_eq!(value["messages"][0]["audio"], "<42 bytes>");
        assert_eq!(value["language"], "en");
        assert_eq!(value["states"][1], "Delivered");
    }

    #[test]
    fn test_config_init_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        handle_config(ConfigAction::Init, dir.path()).unwrap();
        let written = std::fs::read_to_string(dir.path().join(".visage/config.toml")).unwrap();
        assert!(written.contains("[gateway]"));

        // Second run leaves the file alone.
        std::fs::write(dir.path().join(".visage/config.toml"), "# edited").unwrap();
        handle_config(ConfigAction::Init, dir.path()).unwrap();
        let kept = std::fs::read_to_string(dir.path().join(".visage/config.toml")).unwrap();
        assert_eq!(kept, "# edited");
    }
}
