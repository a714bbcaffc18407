// Wed Jan 15 2026 - Alex

use crate::memory::Address;
use crate::rebind::Substitution;
use crate::utils::parse_address;
use clap::Parser;
use std::path::PathBuf;

/// Replacement used when a `--rebind` spec gives no address. Recognisable in
/// a dump and never a valid user-space pointer.
pub const PLACEHOLDER_REPLACEMENT: u64 = 0xfeed_face_cafe_f00d;

#[derive(Parser, Debug)]
#[command(name = "macho-rebind")]
#[command(author = "Alex")]
#[command(version)]
#[command(about = "Lists and rebinds the imported-symbol pointers of a Mach-O image", long_about = None)]
pub struct Args {
    /// Mach-O file to map. The file itself is never written.
    pub binary: PathBuf,

    /// List every symbol pointer slot instead of rebinding.
    #[arg(short, long)]
    pub list: bool,

    /// NAME[@LIBRARY][=ADDRESS], e.g. fopen@/usr/lib/libSystem.B.dylib=0x4000
    #[arg(short, long = "rebind", value_name = "SPEC", value_parser = RebindSpec::parse)]
    pub rebind: Vec<RebindSpec>,

    /// JSON file with engine settings.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address the image is laid out at.
    #[arg(long, value_parser = parse_base, default_value = "0x100000000")]
    pub base: u64,

    #[arg(long)]
    pub json: bool,

    #[arg(long, default_value = "warn")]
    pub log_level: String,

    #[arg(long)]
    pub no_color: bool,
}

impl Args {
    pub fn validate(&self) -> Result<(), String> {
        if self.list && !self.rebind.is_empty() {
            return Err("--list and --rebind cannot be combined".to_string());
        }
        if !self.binary.exists() {
            return Err(format!("Binary does not exist: {}", self.binary.display()));
        }
        Ok(())
    }
}

fn parse_base(s: &str) -> Result<u64, String> {
    parse_address(s).ok_or_else(|| format!("invalid address: {}", s))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebindSpec {
    pub name: String,
    pub library: Option<String>,
    pub address: u64,
}

impl RebindSpec {
    pub fn parse(s: &str) -> Result<Self, String> {
        let (head, address) = match s.rsplit_once('=') {
            Some((head, addr)) => (head, parse_address(addr).ok_or_else(|| format!("invalid address in {:?}", s))?),
            None => (s, PLACEHOLDER_REPLACEMENT),
        };
        let (name, library) = match head.split_once('@') {
            Some((name, lib)) => (name, Some(lib.to_string())),
            None => (head, None),
        };
        if name.is_empty() {
            return Err(format!("missing symbol name in {:?}", s));
        }
        if matches!(library.as_deref(), Some("")) {
            return Err(format!("empty library in {:?}", s));
        }
        Ok(Self {
            name: name.to_string(),
            library,
            address,
        })
    }

    pub fn to_substitution(&self) -> Substitution {
        let sub = Substitution::new(self.name.clone(), Address::new(self.address));
        match &self.library {
            Some(lib) => sub.from_library(lib.clone()),
            None => sub,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rebind_spec() {
        assert_eq!(
            RebindSpec::parse("fprintf").unwrap(),
            RebindSpec {
                name: "fprintf".to_string(),
                library: None,
                address: PLACEHOLDER_REPLACEMENT,
            }
        );
        assert_eq!(
            RebindSpec::parse("fopen@/usr/lib/libSystem.B.dylib=0x4000").unwrap(),
            RebindSpec {
                name: "fopen".to_string(),
                library: Some("/usr/lib/libSystem.B.dylib".to_string()),
                address: 0x4000,
            }
        );
        assert_eq!(RebindSpec::parse("free=16").unwrap().address, 16);
        assert!(RebindSpec::parse("=0x10").is_err());
        assert!(RebindSpec::parse("free@").is_err());
        assert!(RebindSpec::parse("free=nope").is_err());
    }

    #[test]
    fn test_cli_parsing() {
        let args = Args::try_parse_from([
            "macho-rebind",
            "a.out",
            "--rebind",
            "write=0x10",
            "-r",
            "read",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.rebind.len(), 2);
        assert_eq!(args.base, 0x1_0000_0000);
        assert!(args.json);
        assert_eq!(args.rebind[1].to_substitution().replacement(), Address::new(PLACEHOLDER_REPLACEMENT));
    }

    #[test]
    fn test_list_and_rebind_conflict() {
        let args = Args::try_parse_from(["macho-rebind", "/", "--list", "-r", "read"]).unwrap();
        assert!(args.validate().is_err());
    }
}
