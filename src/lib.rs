use clap::{App, Arg, ErrorKind};
use std::{
    collections::HashSet,
    error::Error,
    ffi::{OsStr, OsString},
    io::{self, BufRead, BufWriter, Cursor, Write},
};

type MyResult<T> = Result<T, Box<dyn Error>>;

#[derive(Debug)]
pub struct Config {
    delimiter: u8,
    strings: Vec<Vec<u8>>,
}

/// What the command line asks for.
#[derive(Debug)]
pub enum Args {
    Run(Config),
    Help(String),
    // clap has already written the version to stdout
    Version,
}

pub fn get_args() -> MyResult<Args> {
    parse_args(std::env::args_os())
}

fn app() -> App<'static, 'static> {
    App::new("uniqish")
        .version("0.1.0")
        .author("Marcin Rogowski <rogowskimarcin11@gmail.com>")
        .about("Rust uniqish: drop repeated segments, adjacent or not")
        .arg(
            Arg::with_name("separator")
                .short("s")
                .long("separator")
                .value_name("SEP")
                .takes_value(true)
                .allow_hyphen_values(true)
                .help("The string separator (defaults to newline)"),
        )
        .arg(
            Arg::with_name("strings")
                .multiple(true)
                .value_name("STRINGS")
                .help("Strings to deduplicate [default: read stdin]"),
        )
}

pub fn parse_args<I, T>(args: I) -> MyResult<Args>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = match app().get_matches_from_safe(args) {
        Ok(m) => m,
        Err(e) if e.kind == ErrorKind::HelpDisplayed => return Ok(Args::Help(e.message)),
        Err(e) if e.kind == ErrorKind::VersionDisplayed => return Ok(Args::Version),
        Err(e) => {
            let mut help = Vec::new();
            app().write_help(&mut help)?;
            return Err(format!("{}\n\n{}", e.message, String::from_utf8_lossy(&help)).into());
        }
    };

    let delimiter = match matches.value_of_os("separator") {
        Some(sep) => parse_delimiter(&os_bytes(sep))?,
        None => b'\n',
    };

    Ok(Args::Run(Config {
        delimiter,
        strings: matches
            .values_of_os("strings")
            .map(|values| values.map(os_bytes).collect())
            .unwrap_or_default(),
    }))
}

pub fn run(config: Config) -> MyResult<()> {
    let trailing_newline = stdout_is_human_facing();
    let mut uniqish = Uniqish::new(config.delimiter, BufWriter::new(io::stdout().lock()));

    if config.strings.is_empty() {
        uniqish.process(io::stdin().lock())?;
    } else {
        for string in &config.strings {
            uniqish.process(Cursor::new(string))?;
        }
    }

    // Early returns above leave the flush to BufWriter's Drop.
    let mut out = uniqish.into_inner();
    if trailing_newline {
        out.write_all(b"\n")?;
    }
    out.flush()?;

    Ok(())
}

fn parse_delimiter(sep: &[u8]) -> MyResult<u8> {
    match sep {
        [byte] => Ok(*byte),
        _ => Err(format!(
            "separator must be one byte in length (sep={:?})",
            String::from_utf8_lossy(sep)
        )
        .into()),
    }
}

#[cfg(unix)]
fn os_bytes(s: &OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    s.as_bytes().to_vec()
}

#[cfg(not(unix))]
fn os_bytes(s: &OsStr) -> Vec<u8> {
    s.to_string_lossy().into_owned().into_bytes()
}

/// Best-effort guess at whether stdout is read by a person: anything but a
/// pipe counts. When stdout can't be inspected, assume a person.
#[cfg(unix)]
fn stdout_is_human_facing() -> bool {
    use std::{fs::File, os::fd::AsFd, os::unix::fs::FileTypeExt};

    let metadata = io::stdout()
        .as_fd()
        .try_clone_to_owned()
        .map(File::from)
        .and_then(|f| f.metadata());

    match metadata {
        Ok(m) => !m.file_type().is_fifo(),
        Err(e) => {
            eprintln!("uniqish: error getting stat of stdout: {}", e);
            true
        }
    }
}

#[cfg(not(unix))]
fn stdout_is_human_facing() -> bool {
    true
}

/// Streams segments split on `delimiter` into `out`, keeping only the first
/// occurrence of each.
///
/// One `Uniqish` holds the seen segments for a whole invocation, so every
/// source passed to [`Uniqish::process`] is deduplicated against all the
/// sources before it.
#[derive(Debug)]
pub struct Uniqish<W: Write> {
    delimiter: u8,
    seen: HashSet<Vec<u8>>,
    out: W,
}

impl<W: Write> Uniqish<W> {
    pub fn new(delimiter: u8, out: W) -> Self {
        Uniqish {
            delimiter,
            seen: HashSet::new(),
            out,
        }
    }

    /// Reads `source` to the end and writes every segment not seen before.
    ///
    /// A read error stops this source with a warning on stderr and still
    /// returns `Ok`. A write error is returned to the caller.
    pub fn process<R: BufRead>(&mut self, mut source: R) -> MyResult<()> {
        let mut segment = Vec::new();
        loop {
            segment.clear();
            match source.read_until(self.delimiter, &mut segment) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    eprintln!("uniqish: error reading input segment: {}", e);
                    break;
                }
            }

            if segment.last() == Some(&self.delimiter) {
                segment.pop();
            }
            if segment.is_empty() || self.seen.contains(&segment) {
                continue;
            }

            if !self.seen.is_empty() {
                self.out.write_all(&[self.delimiter])?;
            }
            self.out.write_all(&segment)?;
            self.seen.insert(std::mem::take(&mut segment));
        }

        Ok(())
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Gives back the sink without flushing it.
    pub fn into_inner(self) -> W {
        self.out
    }
}
