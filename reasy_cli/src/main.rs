use anyhow::{Context, Result, anyhow, bail};
use reasy_clipboard::{ClipboardFile, ClipboardStore, PasteOptions, PasteTarget, extract, paste};
use reasy_io::{build, parse, refresh_path_hashes};
use reasy_project::{DEFAULT_LOG_FILTER, ProjectConfig, find_config, load_config, resolve_path};
use reasy_scene::{ContainerBody, ContainerPath, EmbeddedContainer};
use reasy_types::TypeRegistry;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const VALUE_FLAGS: [&str; 4] = ["--config", "--registry", "-o", "--type"];

fn main() {
    let args: Vec<String> = env::args().collect();
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let config = match load_project_config(&args, &cwd) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(1);
        }
    };
    let filter = config
        .as_ref()
        .map_or(DEFAULT_LOG_FILTER, |c| c.log_filter.as_str());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let positional = positionals(&args);
    let Some(&command) = positional.first() else {
        print_usage();
        std::process::exit(2);
    };
    let session = Session {
        args: &args,
        positional: &positional[1..],
        cwd: &cwd,
        config: config.as_ref(),
    };

    let result = match command {
        "info" => info_command(&session),
        "roundtrip" => roundtrip_command(&session),
        "copy" => copy_command(&session),
        "paste" => paste_command(&session),
        "resources" => resources_command(&session),
        "delete" => delete_command(&session),
        _ => {
            print_usage();
            Err(anyhow!("unknown command `{command}`"))
        }
    };

    if let Err(err) = result {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  reasy [--config <reasy.toml>] [--registry <types.json>] <command>");
    eprintln!();
    eprintln!("  reasy info <file>                                   # header, counts, container tree");
    eprintln!("  reasy roundtrip <file> [-o <out>]                   # parse, build, re-parse, compare");
    eprintln!("  reasy copy <file> <container> <index> [--type <T>]  # copy a subgraph to the clipboard");
    eprintln!("  reasy paste <file> <container> <owner> <field> [-o <out>] [--type <T>] [--keep-guids]");
    eprintln!("  reasy resources <file>                              # every resource path");
    eprintln!("  reasy delete <file> <container> <index> [-o <out>]");
    eprintln!();
    eprintln!("  <container> is `root` or owner indices from the top, e.g. `root/12/3`.");
    eprintln!("  Without -o, edits are written back to <file>.");
}

struct Session<'a> {
    args: &'a [String],
    positional: &'a [&'a str],
    cwd: &'a Path,
    config: Option<&'a ProjectConfig>,
}

impl Session<'_> {
    fn arg(&self, index: usize, name: &str) -> Result<&str> {
        self.positional
            .get(index)
            .copied()
            .with_context(|| format!("missing <{name}> argument"))
    }

    fn index_arg(&self, index: usize, name: &str) -> Result<u32> {
        let raw = self.arg(index, name)?;
        raw.parse()
            .with_context(|| format!("<{name}> must be an instance index, got `{raw}`"))
    }

    fn file_arg(&self) -> Result<PathBuf> {
        Ok(resolve_path(Path::new(self.arg(0, "file")?), self.cwd))
    }

    fn output_path(&self, input: &Path) -> PathBuf {
        parse_flag_value(self.args, "-o")
            .map(|p| resolve_path(Path::new(&p), self.cwd))
            .unwrap_or_else(|| input.to_path_buf())
    }

    fn registry(&self) -> Result<TypeRegistry> {
        let path = match parse_flag_value(self.args, "--registry") {
            Some(p) => resolve_path(Path::new(&p), self.cwd),
            None => self
                .config
                .map(|c| c.registry_path.clone())
                .context("no type registry: pass --registry <file> or set [registry] path in reasy.toml")?,
        };
        TypeRegistry::load(&path)
            .with_context(|| format!("failed to load type registry {}", path.display()))
    }

    fn clipboard_store(&self) -> Result<ClipboardStore> {
        match self.config.and_then(|c| c.clipboard_dir.clone()) {
            Some(dir) => Ok(ClipboardStore::new(dir)),
            None => Ok(ClipboardStore::open_default()?),
        }
    }
}

fn load_project_config(args: &[String], cwd: &Path) -> Result<Option<ProjectConfig>> {
    let path = match parse_flag_value(args, "--config") {
        Some(p) => Some(resolve_path(Path::new(&p), cwd)),
        None => find_config(cwd),
    };
    match path {
        Some(path) => load_config(&path)
            .map(Some)
            .with_context(|| format!("failed to load {}", path.display())),
        None => Ok(None),
    }
}

fn parse_flag_value(args: &[String], flag: &str) -> Option<String> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1).cloned()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

/// Arguments that are neither flags nor flag values, program name excluded.
fn positionals(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut skip_value = false;
    for arg in args.iter().skip(1) {
        if skip_value {
            skip_value = false;
        } else if VALUE_FLAGS.contains(&arg.as_str()) {
            skip_value = true;
        } else if !arg.starts_with("--") {
            out.push(arg.as_str());
        }
    }
    out
}

fn read_container(registry: &TypeRegistry, path: &Path) -> Result<EmbeddedContainer> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse(registry, &bytes).with_context(|| format!("failed to parse {}", path.display()))
}

fn write_container(registry: &TypeRegistry, container: &EmbeddedContainer, out: &Path) -> Result<()> {
    let bytes = build(registry, container).context("failed to build container")?;
    fs::write(out, &bytes).with_context(|| format!("failed to write {}", out.display()))?;
    println!("wrote {} bytes to {}", bytes.len(), out.display());
    Ok(())
}

fn container_path(tree: &EmbeddedContainer, raw: &str) -> Result<ContainerPath> {
    let rest = raw.strip_prefix("root").unwrap_or(raw);
    let owners = rest
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .with_context(|| format!("invalid owner index `{s}` in `{raw}`"))
        })
        .collect::<Result<Vec<_>>>()?;
    tree.path_from_indices(&owners)
        .with_context(|| format!("no embedded container at `{raw}`"))
}

fn type_label(registry: &TypeRegistry, type_id: u32) -> String {
    registry
        .type_name(type_id)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{type_id:#x}"))
}

fn info_command(session: &Session) -> Result<()> {
    let registry = session.registry()?;
    let file = session.file_arg()?;
    let tree = read_container(&registry, &file)?;

    println!(
        "{}: magic {:#010x}, version {}, root type {}",
        file.display(),
        tree.header.magic,
        tree.header.version,
        type_label(&registry, tree.type_id)
    );
    for (path, container) in tree.walk() {
        let indent = "  ".repeat(path.depth());
        match &container.body {
            ContainerBody::Heap(heap) => println!(
                "{indent}{path}: owner {}, type {}, hash {:#010x}, {} instance(s), object table {:?}",
                container.owner_index,
                type_label(&registry, container.type_id),
                container.path_hash,
                heap.live_count(),
                heap.object_table()
            ),
            ContainerBody::Opaque(bytes) => println!(
                "{indent}{path}: owner {}, type {}, opaque ({} bytes)",
                container.owner_index,
                type_label(&registry, container.type_id),
                bytes.len()
            ),
        }
    }
    Ok(())
}

fn roundtrip_command(session: &Session) -> Result<()> {
    let registry = session.registry()?;
    let file = session.file_arg()?;
    let original = fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
    let tree = parse(&registry, &original).with_context(|| format!("failed to parse {}", file.display()))?;

    let rebuilt = build(&registry, &tree).context("failed to build container")?;
    let reparsed = parse(&registry, &rebuilt).context("rebuilt container does not parse")?;

    let mut expected = tree.clone();
    refresh_path_hashes(&mut expected);
    if reparsed.heap() != expected.heap() {
        bail!("round trip changed the object graph of {}", file.display());
    }
    println!(
        "round trip ok: {} -> {} bytes{}",
        original.len(),
        rebuilt.len(),
        if original == rebuilt { " (byte-identical)" } else { "" }
    );

    if let Some(out) = parse_flag_value(session.args, "-o") {
        let out = resolve_path(Path::new(&out), session.cwd);
        fs::write(&out, &rebuilt).with_context(|| format!("failed to write {}", out.display()))?;
        println!("wrote {}", out.display());
    }
    Ok(())
}

fn copy_command(session: &Session) -> Result<()> {
    let registry = session.registry()?;
    let file = session.file_arg()?;
    let tree = read_container(&registry, &file)?;
    let path = container_path(&tree, session.arg(1, "container")?)?;
    let index = session.index_arg(2, "index")?;

    let heap = tree.heap_at(&path)?;
    let element = extract(&registry, heap, index)?;
    let count = element.object_graph().map_or(0, |g| g.instances.len());
    let type_name = parse_flag_value(session.args, "--type")
        .or_else(|| element.orig_type().map(str::to_string))
        .unwrap_or_default();

    let store = session.clipboard_store()?;
    let saved = store.save(&ClipboardFile::new(type_name.clone(), vec![element]))?;
    println!(
        "copied {type_name} at {path}:{index} ({count} instance(s)) to {}",
        saved.display()
    );
    Ok(())
}

fn paste_command(session: &Session) -> Result<()> {
    let registry = session.registry()?;
    let file = session.file_arg()?;
    let mut tree = read_container(&registry, &file)?;
    let path = container_path(&tree, session.arg(1, "container")?)?;
    let mut owner = session.index_arg(2, "owner")?;
    let field = session.arg(3, "field")?;

    let element_type = {
        let heap = tree.heap_at(&path)?;
        let inst = heap.instance(owner)?;
        registry
            .field(inst.type_id, field)
            .map(|def| def.element_type().to_string())
            .with_context(|| format!("{} has no field `{field}`", type_label(&registry, inst.type_id)))?
    };
    let key = parse_flag_value(session.args, "--type").unwrap_or_else(|| element_type.clone());
    let store = session.clipboard_store()?;
    let clip = store
        .load(&key)?
        .with_context(|| format!("nothing copied for `{key}` in {}", store.dir().display()))?;
    clip.check_compatible(&element_type)?;

    let randomize = !has_flag(session.args, "--keep-guids")
        && session.config.is_none_or(|c| c.randomize_guids);
    let options = if randomize {
        PasteOptions::default()
    } else {
        PasteOptions::keep_guids()
    };

    for element in &clip.data {
        let target = PasteTarget::Field {
            owner,
            field: field.to_string(),
        };
        let outcome = paste(&registry, &mut tree, &path, &target, element, options)?;
        if owner >= outcome.inserted.start {
            owner += outcome.inserted.len() as u32;
        }
        println!(
            "pasted {} instance(s) at {}..{}",
            outcome.inserted.len(),
            outcome.inserted.start,
            outcome.inserted.end
        );
        if !outcome.unresolved_external_refs.is_empty() {
            log::warn!(
                "external references {:?} do not resolve in {} and were nulled",
                outcome.unresolved_external_refs,
                file.display()
            );
        }
    }

    write_container(&registry, &tree, &session.output_path(&file))
}

fn resources_command(session: &Session) -> Result<()> {
    let registry = session.registry()?;
    let file = session.file_arg()?;
    let tree = read_container(&registry, &file)?;
    for resource in tree.collect_resources() {
        println!("{resource}");
    }
    Ok(())
}

fn delete_command(session: &Session) -> Result<()> {
    let registry = session.registry()?;
    let file = session.file_arg()?;
    let mut tree = read_container(&registry, &file)?;
    let path = container_path(&tree, session.arg(1, "container")?)?;
    let index = session.index_arg(2, "index")?;

    let report = tree.delete_instance(&path, index)?;
    if report.is_noop() {
        println!("instance {index} is referenced from several places; nothing deleted");
        return Ok(());
    }
    println!(
        "deleted {} instance(s) {:?}, nulled {} reference(s), dropped {} root(s) and {} container(s)",
        report.freed.len(),
        report.freed,
        report.nulled_references,
        report.dropped_roots,
        report.removed_containers
    );
    write_container(&registry, &tree, &session.output_path(&file))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn positionals_skip_flags_and_their_values() {
        let a = args(&[
            "reasy", "--registry", "t.json", "paste", "a.scn", "root/3", "7", "Items", "-o", "b.scn",
            "--keep-guids",
        ]);
        assert_eq!(positionals(&a), vec!["paste", "a.scn", "root/3", "7", "Items"]);
        assert_eq!(parse_flag_value(&a, "-o").as_deref(), Some("b.scn"));
        assert!(has_flag(&a, "--keep-guids"));
    }

    #[test]
    fn container_path_parses_root_and_rejects_garbage() {
        let tree = EmbeddedContainer::top_level(
            1,
            reasy_scene::ContainerHeader::default(),
            reasy_scene::InstanceHeap::new(),
        );
        assert_eq!(container_path(&tree, "root").unwrap(), ContainerPath::root());
        assert!(container_path(&tree, "root/x").is_err());
        assert!(container_path(&tree, "root/4").is_err());
    }
}
