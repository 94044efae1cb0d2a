use std::env::set_var;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use clap::{arg, command, ArgAction, Command};
use log::*;
use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

use zparcel::list::Entry;
use zparcel::object::Value;
use zparcel::parcel::Parcel;
use zparcel::types::ObjectType;
use zparcel_device::{ByteDevice, FileDevice};

fn main() {
    if let Err(e) = run() {
        eprintln!("FAIL - {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let matches = command!()
        .arg(arg!(<file> "Parcel file path"))
        .arg(arg!(-v --verbose "Print more debug information, or set `RUST_LOG=debug`").action(ArgAction::SetTrue))
        .subcommand_required(true)
        .subcommand(Command::new("create").about("Format a new parcel"))
        .subcommand(Command::new("list").about("Pre-order dump of the tree"))
        .subcommand(
            Command::new("store")
                .about("Insert a typed object")
                .arg(arg!(<uuid> "uuid, \"time\", or \"random\""))
                .arg(arg!(<type> "null|bool|uint|int|float|uid|blob|str|list|file"))
                .arg(arg!(<value> "literal value, or a path for blob/file")),
        )
        .subcommand(Command::new("fetch").about("Decode and print an object").arg(arg!(<uuid> "object uuid")))
        .subcommand(Command::new("show").about("Human-readable metadata").arg(arg!(<uuid> "object uuid")))
        .subcommand(Command::new("remove").about("Tombstone and free an object").arg(arg!(<uuid> "object uuid")))
        .subcommand(Command::new("root").about("Print or set the root pointer").arg(arg!([uuid] "uuid to set as root")))
        .subcommand(Command::new("test").about("Store and fetch 100 random strings"))
        .get_matches();

    if matches.get_flag("verbose") {
        set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    let file = matches.get_one::<String>("file").unwrap();

    match matches.subcommand() {
        Some(("create", _)) => cmd_create(file),
        Some(("list", _)) => cmd_list(file),
        Some(("store", sub)) => cmd_store(
            file,
            sub.get_one::<String>("uuid").unwrap(),
            sub.get_one::<String>("type").unwrap(),
            sub.get_one::<String>("value").unwrap(),
        ),
        Some(("fetch", sub)) => cmd_fetch(file, sub.get_one::<String>("uuid").unwrap()),
        Some(("show", sub)) => cmd_show(file, sub.get_one::<String>("uuid").unwrap()),
        Some(("remove", sub)) => cmd_remove(file, sub.get_one::<String>("uuid").unwrap()),
        Some(("root", sub)) => cmd_root(file, sub.get_one::<String>("uuid")),
        Some(("test", _)) => cmd_test(file),
        _ => unreachable!("clap requires a subcommand"),
    }
}

fn open_parcel(file: &str) -> Result<Parcel<FileDevice>> {
    let dev = FileDevice::open(file).map_err(|e| zparcel::ParcelError::Open(format!("{file}: {e}")))?;
    Ok(Parcel::open(dev)?)
}

fn cmd_create(file: &str) -> Result<()> {
    let dev = FileDevice::create(file).map_err(|e| zparcel::ParcelError::Open(format!("{file}: {e}")))?;
    Parcel::create(dev)?;
    info!("created parcel at {file}");
    println!("OK");
    Ok(())
}

fn cmd_list(file: &str) -> Result<()> {
    let mut parcel = open_parcel(file)?;
    for Entry { uuid, object_type, depth } in parcel.list()? {
        println!("{}{} {:?}", "  ".repeat(depth as usize), uuid, object_type);
    }
    Ok(())
}

/// Resolves the `store` command's first positional: a literal UUID, or the
/// `time`/`random` generator keywords.
fn resolve_uuid(spec: &str) -> Result<Uuid> {
    match spec {
        "random" => Ok(Uuid::new_v4()),
        "time" => {
            // No MAC-address source is wired up; a random node id stands in.
            let node_id: [u8; 6] = rand::thread_rng().gen();
            Ok(Uuid::now_v1(&node_id))
        }
        other => Uuid::parse_str(other).with_context(|| format!("invalid uuid {other}")),
    }
}

fn cmd_store(file: &str, uuid_spec: &str, type_spec: &str, value: &str) -> Result<()> {
    let mut parcel = open_parcel(file)?;
    let uuid = resolve_uuid(uuid_spec)?;

    match type_spec {
        "file" => {
            let path = Path::new(value);
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("no file name in path {value}"))?
                .to_string_lossy()
                .to_string();
            let f = File::open(path).with_context(|| format!("opening {value}"))?;
            let len = f.metadata()?.len();
            parcel.store_file(uuid, &name, f, len)?;
        }
        other => {
            let parsed = parse_value(other, value)?;
            parcel.store(uuid, parsed)?;
        }
    }

    println!("{uuid}");
    Ok(())
}

fn parse_value(type_spec: &str, value: &str) -> Result<Value> {
    Ok(match type_spec {
        "null" => Value::Null,
        "bool" => Value::Bool(value.parse().with_context(|| format!("invalid bool {value}"))?),
        "uint" => Value::Uint(value.parse().with_context(|| format!("invalid uint {value}"))?),
        "int" | "sint" => Value::Sint(value.parse().with_context(|| format!("invalid int {value}"))?),
        "float" | "double" => Value::Float(value.parse().with_context(|| format!("invalid float {value}"))?),
        "uid" | "uuid" | "zuid" => Value::Uuid(Uuid::parse_str(value).with_context(|| format!("invalid uuid {value}"))?),
        "bin" | "blob" | "binary" => {
            let bytes = std::fs::read(value).with_context(|| format!("reading {value}"))?;
            Value::Blob(bytes)
        }
        "str" | "string" => Value::String(value.to_string()),
        "list" => {
            let items = value
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|s| Uuid::parse_str(s).with_context(|| format!("invalid uuid {s}")))
                .collect::<Result<Vec<_>>>()?;
            Value::List(items)
        }
        other => bail!("unknown type keyword {other}"),
    })
}

fn cmd_fetch(file: &str, uuid_str: &str) -> Result<()> {
    let mut parcel = open_parcel(file)?;
    let uuid = Uuid::parse_str(uuid_str).with_context(|| format!("invalid uuid {uuid_str}"))?;

    if parcel.get_type(uuid)? == ObjectType::File {
        let (name, mut stream) = parcel.fetch_file(uuid)?;
        let mut out = File::options()
            .write(true)
            .create_new(true)
            .open(&name)
            .with_context(|| format!("{name} already exists"))?;
        let mut buf = [0u8; 8192];
        loop {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])?;
        }
        println!("{name}");
        return Ok(());
    }

    match parcel.fetch(uuid)? {
        Value::Null => println!("null"),
        Value::Bool(b) => println!("{b}"),
        Value::Uint(v) => println!("{v}"),
        Value::Sint(v) => println!("{v}"),
        Value::Float(v) => println!("{v}"),
        Value::Uuid(v) => println!("{v}"),
        Value::Blob(bytes) => io::stdout().write_all(&bytes)?,
        Value::String(s) => println!("{s}"),
        Value::List(items) => {
            let joined = items.iter().map(|u| u.to_string()).collect::<Vec<_>>().join(",");
            println!("{joined}");
        }
        Value::File(..) => unreachable!("handled above"),
    }
    Ok(())
}

fn cmd_show(file: &str, uuid_str: &str) -> Result<()> {
    let mut parcel = open_parcel(file)?;
    let uuid = Uuid::parse_str(uuid_str).with_context(|| format!("invalid uuid {uuid_str}"))?;
    let object_type = parcel.get_type(uuid)?;
    println!("uuid: {uuid}");
    println!("type: {object_type:?}");
    if object_type != ObjectType::Null && object_type != ObjectType::File {
        println!("value: {:?}", parcel.fetch(uuid)?);
    }
    Ok(())
}

fn cmd_remove(file: &str, uuid_str: &str) -> Result<()> {
    let mut parcel = open_parcel(file)?;
    let uuid = Uuid::parse_str(uuid_str).with_context(|| format!("invalid uuid {uuid_str}"))?;
    parcel.remove(uuid)?;
    println!("OK");
    Ok(())
}

fn cmd_root(file: &str, uuid_str: Option<&String>) -> Result<()> {
    let mut parcel = open_parcel(file)?;
    match uuid_str {
        Some(s) => {
            let uuid = Uuid::parse_str(s).with_context(|| format!("invalid uuid {s}"))?;
            parcel.set_root(uuid)?;
            println!("{uuid}");
        }
        None => match parcel.get_root() {
            Some(uuid) => println!("{uuid}"),
            None => println!("none"),
        },
    }
    Ok(())
}

fn cmd_test(file: &str) -> Result<()> {
    let mut parcel = open_parcel(file)?;
    let mut rng = rand::thread_rng();

    let mut stored = Vec::with_capacity(100);
    for _ in 0..100 {
        let uuid = Uuid::new_v4();
        let s: String = (&mut rng).sample_iter(Alphanumeric).take(32).map(char::from).collect();
        parcel.store(uuid, Value::String(s.clone()))?;
        stored.push((uuid, s));
    }

    for (uuid, expected) in &stored {
        match parcel.fetch_typed(*uuid, ObjectType::String)? {
            Value::String(got) if got == *expected => {}
            other => bail!("roundtrip mismatch for {uuid}: {other:?}"),
        }
    }

    println!("OK - stored and verified {} strings", stored.len());
    Ok(())
}
