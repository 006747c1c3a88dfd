use std::{fmt::Write, str::FromStr};

use log::*;
use nix::unistd::Pid;

use crate::Result;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ProcMapsError {
    #[error("The permission string needs to be of length 4, got {0:?}")]
    PermissionLength(String),
    #[error("Could not parse field {0} with base {1}")]
    IntegerField(&'static str, u32),
    #[error("Expected field {0} to be present")]
    ExpectedField(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingPermissions {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    pub private: bool,
}

impl MappingPermissions {
    fn from_str(value: &str) -> std::result::Result<Self, ProcMapsError> {
        let chars: Vec<char> = value.chars().collect();
        if chars.len() != 4 {
            return Err(ProcMapsError::PermissionLength(value.to_owned()));
        }

        let permissions = Self {
            read: chars[0] == 'r',
            write: chars[1] == 'w',
            execute: chars[2] == 'x',
            private: chars[3] == 'p',
        };

        Ok(permissions)
    }
}

impl std::fmt::Display for MappingPermissions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flag = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}{}",
            flag(self.read, 'r'),
            flag(self.write, 'w'),
            flag(self.execute, 'x'),
            if self.private { 'p' } else { 's' }
        )
    }
}

/// One line of `/proc/<pid>/maps`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcMapping {
    pub range_from: u64,
    pub range_to: u64,
    pub permissions: MappingPermissions,
    pub offset: u64,
    pub device_major: u64,
    pub device_minor: u64,
    pub inode_number: u64,
    pub pathname: Option<String>,
}

impl ProcMapping {
    fn parse_range(
        entry: &str,
        separator: char,
        radix: u32,
    ) -> std::result::Result<(u64, u64), ProcMapsError> {
        let mut range = entry.split(separator);
        let range_from = range
            .next()
            .and_then(|s| u64::from_str_radix(s, radix).ok())
            .ok_or(ProcMapsError::IntegerField("range_from", radix))?;
        let range_to = range
            .next()
            .and_then(|s| u64::from_str_radix(s, radix).ok())
            .ok_or(ProcMapsError::IntegerField("range_to", radix))?;

        Ok((range_from, range_to))
    }

    pub fn size(&self) -> u64 {
        self.range_to.saturating_sub(self.range_from)
    }
}

impl FromStr for ProcMapping {
    type Err = ProcMapsError;

    fn from_str(entry: &str) -> std::result::Result<Self, Self::Err> {
        let mut rest = entry;
        let range = next_field(&mut rest).ok_or(ProcMapsError::ExpectedField("range"))?;
        let (range_from, range_to) = Self::parse_range(range, '-', 16)?;

        let permissions =
            next_field(&mut rest).ok_or(ProcMapsError::ExpectedField("permissions"))?;
        let permissions = MappingPermissions::from_str(permissions)?;

        let offset = next_field(&mut rest).ok_or(ProcMapsError::ExpectedField("offset"))?;
        let offset = u64::from_str_radix(offset, 16)
            .map_err(|_| ProcMapsError::IntegerField("offset", 16))?;

        let device = next_field(&mut rest).ok_or(ProcMapsError::ExpectedField("device"))?;
        let (device_major, device_minor) = Self::parse_range(device, ':', 16)?;

        let inode_number =
            next_field(&mut rest).ok_or(ProcMapsError::ExpectedField("inode_number"))?;
        let inode_number = inode_number
            .parse::<u64>()
            .map_err(|_| ProcMapsError::IntegerField("inode_number", 10))?;

        // The pathname is the rest of the line and may contain spaces,
        // e.g. "/tmp/my file (deleted)"
        let pathname = rest.trim_start();
        let pathname = (!pathname.is_empty()).then(|| pathname.to_owned());

        Ok(Self {
            range_from,
            range_to,
            permissions,
            offset,
            device_major,
            device_minor,
            inode_number,
            pathname,
        })
    }
}

/// Splits off the next space separated field and advances `rest` past it.
fn next_field<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let line = rest.trim_start_matches(' ');
    if line.is_empty() {
        return None;
    }
    let (field, remainder) = line.split_once(' ').unwrap_or((line, ""));
    *rest = remainder;
    Some(field)
}

#[derive(Debug)]
pub struct ProcMemoryMaps {
    pid: Option<Pid>,
    mappings: Vec<ProcMapping>,
}

impl ProcMemoryMaps {
    pub fn from_pid(pid: Pid) -> Result<Self> {
        let maps_content = std::fs::read_to_string(format!("/proc/{pid}/maps"))?;
        debug!("Read {} bytes from /proc/{pid}/maps", maps_content.len());

        let mut maps = Self::parse(&maps_content)?;
        maps.pid = Some(pid);
        Ok(maps)
    }

    pub fn parse(maps_content: &str) -> Result<Self> {
        let mappings = maps_content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(ProcMapping::from_str)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            pid: None,
            mappings,
        })
    }

    pub fn mappings(&self) -> &[ProcMapping] {
        &self.mappings
    }

    pub fn first_executable(&self) -> Option<&ProcMapping> {
        self.mappings.iter().find(|map| map.permissions.execute)
    }

    /// Renders the mappings the way a debugger prints `info proc mappings`.
    pub fn render_report(&self) -> String {
        let mut report = String::new();

        // Writing into a String cannot fail
        if let Some(pid) = self.pid {
            let _ = writeln!(report, "process {pid}");
        }
        let _ = writeln!(report, "Mapped address spaces:");
        let _ = writeln!(report);
        let _ = writeln!(
            report,
            "{:>18} {:>18} {:>10} {:>10}  {:<5}  {}",
            "Start Addr", "End Addr", "Size", "Offset", "Perms", "objfile"
        );

        for map in &self.mappings {
            let _ = write!(
                report,
                "{:>18} {:>18} {:>10} {:>10}  {:<5}",
                format!("{:#x}", map.range_from),
                format!("{:#x}", map.range_to),
                format!("{:#x}", map.size()),
                format!("{:#x}", map.offset),
                map.permissions.to_string(),
            );
            match &map.pathname {
                Some(pathname) => {
                    let _ = writeln!(report, "  {pathname}");
                }
                None => {
                    let _ = writeln!(report);
                }
            }
        }

        report
    }
}
