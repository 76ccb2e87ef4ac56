use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use snapws_workspace::{
    ticket_workspace_name, LayerKey, LayerSummary, RoleSelector, Workspace,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "snapws",
    about = "Inspect and edit imaging workspace files",
    author,
    version
)]
struct Cli {
    /// 記錄層級；`RUST_LOG` 優先。 / Log level; `RUST_LOG` takes precedence.
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 列出工作區圖層。 / List the layers of a workspace.
    Info(InfoArgs),
    /// 列出所有鍵與值。 / Dump every dotted key with its value.
    Keys(WorkspaceArg),
    /// 新增影像圖層。 / Append an image layer.
    AddLayer(LayerArgs),
    /// 設定（取代）指定角色的圖層。 / Set the image layer of a role, replacing it when present.
    SetLayer(LayerArgs),
    /// 新增網格圖層。 / Append a standalone mesh layer.
    AddMesh(MeshArgs),
    /// 管理圖層標籤。 / Manage layer tags.
    #[command(subcommand)]
    Tag(TagCommand),
    /// 設定圖層暱稱。 / Set a layer nickname.
    Nickname(NicknameArgs),
    /// 重設標籤表。 / Reset the label table to the clear label.
    ClearLabels(OutputArgs),
    /// 匯出自足的工作區副本。 / Export a self-contained copy of the workspace.
    Export(ExportArgs),
    /// 以主影像建立新工作區。 / Create a workspace around a main image.
    New(NewArgs),
}

#[derive(Args)]
struct WorkspaceArg {
    /// 工作區檔案。 / Workspace file.
    #[arg(value_name = "WS")]
    workspace: PathBuf,
}

#[derive(Args)]
struct OutputArgs {
    #[command(flatten)]
    input: WorkspaceArg,
    /// 輸出檔案；預設覆寫原檔。 / Output file; defaults to overwriting the input.
    #[arg(long, short = 'o', value_name = "WS_OUT")]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct InfoArgs {
    #[command(flatten)]
    input: WorkspaceArg,
    /// 以 JSON 輸出。 / Print JSON instead of a table.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct LayerArgs {
    #[command(flatten)]
    target: OutputArgs,
    /// 影像檔案。 / Image file.
    #[arg(value_name = "IMAGE")]
    image: PathBuf,
    /// 圖層角色。 / Layer role.
    #[arg(long, value_enum)]
    role: RoleChoice,
}

#[derive(Args)]
struct MeshArgs {
    #[command(flatten)]
    target: OutputArgs,
    /// 網格檔案。 / Mesh file.
    #[arg(value_name = "MESH")]
    mesh: PathBuf,
    /// 時間點（自 1 起算）。 / Time point, starting at 1.
    #[arg(long, default_value_t = 1)]
    time_point: u32,
}

#[derive(Subcommand)]
enum TagCommand {
    /// 新增標籤。 / Add a tag to a layer.
    Add(TagArgs),
    /// 移除標籤。 / Remove a tag from a layer.
    Remove(TagArgs),
    /// 尋找帶有標籤的圖層。 / List layers carrying a tag.
    Find(FindTagArgs),
}

#[derive(Args)]
struct TagArgs {
    #[command(flatten)]
    target: OutputArgs,
    /// 圖層簡寫，例如 `2`、`M`、`S:-1`。 / Layer specifier such as `2`, `M` or `S:-1`.
    #[arg(value_name = "LAYER")]
    layer: String,
    #[arg(value_name = "TAG")]
    tag: String,
}

#[derive(Args)]
struct FindTagArgs {
    #[command(flatten)]
    input: WorkspaceArg,
    #[arg(value_name = "TAG")]
    tag: String,
}

#[derive(Args)]
struct NicknameArgs {
    #[command(flatten)]
    target: OutputArgs,
    /// 圖層簡寫。 / Layer specifier.
    #[arg(value_name = "LAYER")]
    layer: String,
    #[arg(value_name = "NAME")]
    name: String,
}

#[derive(Args)]
struct ExportArgs {
    #[command(flatten)]
    input: WorkspaceArg,
    /// 匯出的工作區檔案；搭配 --ticket 時為目錄。 / Exported workspace file, or a directory with --ticket.
    #[arg(value_name = "TARGET")]
    target: PathBuf,
    /// 以內容雜湊命名圖層檔案。 / Name layer files after their content hash.
    #[arg(long)]
    scramble: bool,
    /// 以工單編號命名工作區。 / Name the workspace after a processing ticket.
    #[arg(long, value_name = "ID")]
    ticket: Option<u64>,
    /// 工單檔名後綴。 / Suffix appended to the ticket workspace name.
    #[arg(long, value_name = "SUFFIX", default_value = "", requires = "ticket")]
    suffix: String,
}

#[derive(Args)]
struct NewArgs {
    /// 新工作區檔案。 / Workspace file to create.
    #[arg(value_name = "WS_OUT")]
    output: PathBuf,
    /// 主影像。 / Main image.
    #[arg(value_name = "MAIN_IMAGE")]
    main_image: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleChoice {
    #[value(aliases = ["MainRole", "m"])]
    Main,
    #[value(aliases = ["SegmentationRole", "seg", "s"])]
    Segmentation,
    #[value(aliases = ["OverlayRole", "o"])]
    Overlay,
    #[value(aliases = ["AnatomicalRole", "a"])]
    Anatomical,
}

impl From<RoleChoice> for RoleSelector {
    fn from(choice: RoleChoice) -> Self {
        match choice {
            RoleChoice::Main => RoleSelector::MAIN,
            RoleChoice::Segmentation => RoleSelector::SEGMENTATION,
            RoleChoice::Overlay => RoleSelector::OVERLAY,
            RoleChoice::Anatomical => RoleSelector::Anatomical,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;
    match cli.command {
        Commands::Info(args) => execute_info(args),
        Commands::Keys(args) => execute_keys(args),
        Commands::AddLayer(args) => execute_layer(args, false),
        Commands::SetLayer(args) => execute_layer(args, true),
        Commands::AddMesh(args) => execute_add_mesh(args),
        Commands::Tag(command) => execute_tag_command(command),
        Commands::Nickname(args) => execute_nickname(args),
        Commands::ClearLabels(args) => execute_clear_labels(args),
        Commands::Export(args) => execute_export(args),
        Commands::New(args) => execute_new(args),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level '{level}'"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_workspace(path: &Path) -> Result<Workspace> {
    Workspace::load(path).with_context(|| format!("failed to load {}", path.display()))
}

fn save_workspace(workspace: &mut Workspace, args: &OutputArgs) -> Result<PathBuf> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.workspace.clone());
    workspace
        .save(&output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    Ok(output)
}

fn resolve_layer(workspace: &Workspace, spec: &str) -> Result<LayerKey> {
    if let Ok(key) = spec.parse::<LayerKey>() {
        workspace.layer_folder(key)?;
        return Ok(key);
    }
    Ok(workspace.layer_spec_to_key(spec)?)
}

fn execute_info(args: InfoArgs) -> Result<()> {
    let workspace = load_workspace(&args.input.workspace)?;
    let layers = workspace.layers();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&layers)?);
        return Ok(());
    }
    if let Some(saved) = workspace.saved_directory() {
        println!("Save location: {}", saved.display());
    }
    if workspace.is_moved() {
        println!("Workspace has moved since it was saved");
    }
    if layers.is_empty() {
        println!("No layers");
    }
    for layer in &layers {
        print_layer(layer);
    }
    Ok(())
}

fn print_layer(layer: &LayerSummary) {
    let role = layer
        .role
        .as_ref()
        .map(|role| role.to_string())
        .unwrap_or_else(|| "mesh".to_string());
    let path = layer
        .path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_default();
    println!("{}  {role}  {path}", layer.key);
    if let Some(nickname) = &layer.nickname {
        println!("    nickname: {nickname}");
    }
    if !layer.tags.is_empty() {
        println!("    tags: {}", layer.tags.join(", "));
    }
}

fn execute_keys(args: WorkspaceArg) -> Result<()> {
    let workspace = load_workspace(&args.workspace)?;
    let registry = workspace.registry();
    for key in registry.collect_keys("") {
        let value = registry
            .get_entry(&key)
            .and_then(|value| value.as_str())
            .unwrap_or_default();
        println!("{key} = {value}");
    }
    Ok(())
}

fn execute_layer(args: LayerArgs, replace: bool) -> Result<()> {
    let mut workspace = load_workspace(&args.target.input.workspace)?;
    let selector = RoleSelector::from(args.role);
    let key = if replace {
        workspace.set_layer(&selector, &args.image)?
    } else {
        workspace.add_layer(&selector, &args.image)?
    };
    let output = save_workspace(&mut workspace, &args.target)?;
    println!("{key} <- {} ({})", args.image.display(), output.display());
    Ok(())
}

fn execute_add_mesh(args: MeshArgs) -> Result<()> {
    let mut workspace = load_workspace(&args.target.input.workspace)?;
    let key = workspace.add_mesh_layer(&args.mesh, args.time_point)?;
    let output = save_workspace(&mut workspace, &args.target)?;
    println!("{key} <- {} ({})", args.mesh.display(), output.display());
    Ok(())
}

fn execute_tag_command(command: TagCommand) -> Result<()> {
    match command {
        TagCommand::Add(args) => update_tag(args, true),
        TagCommand::Remove(args) => update_tag(args, false),
        TagCommand::Find(args) => find_tag(args),
    }
}

fn update_tag(args: TagArgs, add: bool) -> Result<()> {
    if args.tag.contains(',') {
        bail!("tags cannot contain ','");
    }
    let mut workspace = load_workspace(&args.target.input.workspace)?;
    let key = resolve_layer(&workspace, &args.layer)?;
    if add {
        workspace.add_layer_tag(key, &args.tag)?;
    } else {
        workspace.remove_layer_tag(key, &args.tag)?;
    }
    save_workspace(&mut workspace, &args.target)?;
    let tags = workspace.layer_tags(key)?;
    println!(
        "{key}: {}",
        tags.into_iter().collect::<Vec<_>>().join(", ")
    );
    Ok(())
}

fn find_tag(args: FindTagArgs) -> Result<()> {
    let workspace = load_workspace(&args.input.workspace)?;
    for key in workspace.find_layers_by_tag(&args.tag) {
        println!("{key}");
    }
    Ok(())
}

fn execute_nickname(args: NicknameArgs) -> Result<()> {
    let mut workspace = load_workspace(&args.target.input.workspace)?;
    let key = resolve_layer(&workspace, &args.layer)?;
    workspace.set_layer_nickname(key, &args.name)?;
    save_workspace(&mut workspace, &args.target)?;
    println!("{key}: {}", args.name);
    Ok(())
}

fn execute_clear_labels(args: OutputArgs) -> Result<()> {
    let mut workspace = load_workspace(&args.input.workspace)?;
    if !workspace.clear_labels()? {
        println!("Workspace has no label table");
        return Ok(());
    }
    let output = save_workspace(&mut workspace, &args)?;
    println!("Reset label table in {}", output.display());
    Ok(())
}

fn execute_export(args: ExportArgs) -> Result<()> {
    let workspace = load_workspace(&args.input.workspace)?;
    let target = match args.ticket {
        Some(ticket) => args.target.join(ticket_workspace_name(ticket, &args.suffix)),
        None => args.target.clone(),
    };
    let report = workspace
        .export(&target, args.scramble)
        .with_context(|| format!("failed to export to {}", target.display()))?;
    for file in report.files() {
        println!("{}", file.display());
    }
    Ok(())
}

fn execute_new(args: NewArgs) -> Result<()> {
    if args.output.exists() {
        bail!("'{}' already exists", args.output.display());
    }
    let mut workspace = Workspace::new();
    let key = workspace.add_layer(&RoleSelector::MAIN, &args.main_image)?;
    workspace
        .save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    println!("{key} <- {} ({})", args.main_image.display(), args.output.display());
    Ok(())
}
