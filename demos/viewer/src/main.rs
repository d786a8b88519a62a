use flow_viewer::{ConfigPatch, ViewerEvent, ViewerOptions};

/// Usage: `viewer <model.gltf|model.obj> [config.json]`
fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let model = args.next();
    let config = match args.next() {
        Some(path) => ConfigPatch::from_json(&std::fs::read_to_string(path)?)?,
        None => ConfigPatch::from_json(r#"{ "grid": { "enable": true }, "edges": { "enable": true } }"#)?,
    };

    let options = ViewerOptions {
        title: model.clone().unwrap_or_else(|| "flow-viewer".to_string()),
        model,
        config,
    };
    flow_viewer::run(options, |event| match event {
        ViewerEvent::Progress(_) => log::debug!("{}", event),
        _ => log::info!("{}", event),
    })
}
