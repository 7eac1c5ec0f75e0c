use anyhow::{Context as _, Result};
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use hydra_music::audio::{registry::SessionRegistry, resolver::TrackResolver};
use hydra_music::bot::{
    dispatcher::{CommandDispatcher, CommandPolicy},
    HydraBot,
};
use hydra_music::config::Config;
use hydra_music::node::{lavalink::LavalinkNode, NodeHealth};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hydra_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Hydra Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load().context("Configuración inválida")?;
    info!("{}", config.summary());

    // Songbird solo hace la señalización de voz; el audio lo manda Lavalink
    let songbird = Songbird::serenity();
    let (node, node_events) = LavalinkNode::new(&config, songbird.clone());

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&node).await;
    }

    let health = NodeHealth::new();
    let registry = Arc::new(SessionRegistry::new(
        node.clone(),
        health.clone(),
        config.default_volume,
    ));
    let resolver = Arc::new(TrackResolver::new(node.clone(), config.search_prefix.clone()));
    let dispatcher = Arc::new(CommandDispatcher::new(
        registry.clone(),
        resolver,
        CommandPolicy::from_config(&config),
        config.command_prefix.clone(),
    ));

    let shutdown = CancellationToken::new();
    let handler = HydraBot::new(dispatcher, registry, health, node_events, shutdown.clone());

    // Intents mínimos: mensajes con contenido y estados de voz
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await
        .context("Error al construir el cliente de Discord")?;

    // Lavalink necesita el id del bot para abrir el websocket
    let user_id = client.http.get_current_user().await?.id;
    let node_task = node.spawn_event_loop(user_id, shutdown.clone());

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        signal_token.cancel();
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    shutdown.cancel();
    if let Err(e) = node_task.await {
        error!("El lazo de Lavalink terminó con error: {:?}", e);
    }

    Ok(())
}

async fn health_check(node: &LavalinkNode) -> Result<()> {
    let version = node
        .version()
        .await
        .context("El nodo Lavalink no responde")?;
    println!("OK (Lavalink {})", version.trim());
    Ok(())
}
