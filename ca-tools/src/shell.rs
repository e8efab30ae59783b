use crate::error::{Result, ToolError};
use crate::ignore::IgnoreRules;
use crate::sandbox::Sandbox;
use crate::traits::{Tool, ToolSpec, require_string};
use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::process::Command;

const OUTPUT_BYTES_MAX: usize = 32_000;

/// Shell metacharacters. Commands never go through a shell, but a token
/// carrying one of these is a sign the model expects shell semantics.
const FORBIDDEN_CHARS: &[char] = &[';', '`', '$', '>', '<', '|', '&', '\n', '\r', '(', ')'];

/// Read-only inspection commands the `bash` tool may run.
pub const ALLOWED_COMMANDS: &[&str] = &[
    "ls", "cat", "grep", "rg", "sed", "awk", "find", "head", "tail", "wc", "cut", "sort", "uniq",
    "stat", "readlink", "basename", "dirname", "echo", "printf", "tree", "file", "diff", "pwd",
];

const SEARCH_COMMANDS: &[&str] = &["grep", "rg"];

static DOTDOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|/)\.\.(?:/|$)").expect("dotdot regex should compile"));

/// A program and its arguments, executed directly without a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

/// Validates a `bash` tool command: whitespace tokens only, no
/// metacharacters, an allowlisted program, no write flags, and no absolute or
/// traversing path arguments.
pub fn parse_bash_command(raw: &str) -> Result<CommandLine> {
    let cmdline = raw.trim();
    if cmdline.is_empty() {
        return Err(ToolError::InvalidArguments("no command provided".to_string()));
    }
    if let Some(ch) = cmdline.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(ToolError::Unauthorized(format!(
            "unsupported character {ch:?} in command"
        )));
    }

    let mut tokens = cmdline.split_whitespace().map(str::to_string);
    let Some(program) = tokens.next() else {
        return Err(ToolError::InvalidArguments("empty command".to_string()));
    };
    let args: Vec<String> = tokens.collect();

    if !ALLOWED_COMMANDS.contains(&program.as_str()) {
        return Err(ToolError::Unauthorized(format!(
            "command {program:?} is not allowed; allowed commands: {}",
            ALLOWED_COMMANDS.join(", ")
        )));
    }
    check_write_flags(&program, &args)?;
    match program.as_str() {
        "sed" => {
            let (scripts, operands) = split_sed_args(&args)?;
            for script in scripts {
                check_sed_script(script)?;
            }
            check_path_args(operands)?;
        }
        "awk" => check_path_args(split_awk_args(&args)?)?,
        "grep" | "rg" => {
            let (_, operands) = split_search_args(&args);
            check_path_args(operands)?;
        }
        _ => check_path_args(&args)?,
    }
    Ok(CommandLine { program, args })
}

/// Validates a `grep` tool command and adds the ignore exclusions. Simple
/// single and double quotes group words since search patterns often need them.
pub fn parse_search_command(raw: &str, rules: &IgnoreRules) -> Result<CommandLine> {
    let cmdline = raw.trim();
    if cmdline.is_empty() {
        return Err(ToolError::InvalidArguments("no command provided".to_string()));
    }
    if cmdline.contains(['\n', '\r', '\0']) {
        return Err(ToolError::Unauthorized(
            "the search command must be a single line".to_string(),
        ));
    }

    let mut tokens = tokenize_quoted(cmdline)?.into_iter();
    let Some(program) = tokens.next() else {
        return Err(ToolError::InvalidArguments("empty command".to_string()));
    };
    let user_args: Vec<String> = tokens.collect();

    if !SEARCH_COMMANDS.contains(&program.as_str()) {
        return Err(ToolError::Unauthorized(format!(
            "the grep tool only runs grep or rg, got {program:?}"
        )));
    }
    check_write_flags(&program, &user_args)?;
    let (_, operands) = split_search_args(&user_args);
    check_path_args(operands)?;

    // Exclusions go first: BSD grep stops option parsing at the first operand.
    let mut args = Vec::new();
    match program.as_str() {
        "rg" => {
            for p in rules.dir_patterns().chain(rules.file_patterns()) {
                args.push(format!("--glob=!{p}"));
            }
        }
        _ => {
            for p in rules.dir_patterns() {
                args.push(format!("--exclude-dir={p}"));
            }
            for p in rules.file_patterns() {
                args.push(format!("--exclude={p}"));
            }
        }
    }
    args.extend(user_args);
    Ok(CommandLine { program, args })
}

fn check_write_flags(program: &str, args: &[String]) -> Result<()> {
    let denied = |what: &str| Err(ToolError::Unauthorized(format!("{what} is not allowed")));
    match program {
        "sed" if args.iter().any(|a| a.starts_with("-i") || a.starts_with("--in-place")) => {
            denied("sed -i")
        }
        "find"
            if args.iter().any(|a| {
                matches!(
                    a.as_str(),
                    "-exec" | "-execdir" | "-ok" | "-okdir" | "-delete" | "-fprint" | "-fprint0"
                        | "-fprintf" | "-fls"
                )
            }) =>
        {
            denied("find with -exec/-ok/-delete/-fprint")
        }
        "sort"
            if args.iter().any(|a| {
                a.starts_with("-o") || a.starts_with("--output") || a.starts_with("--compress-program")
            }) =>
        {
            denied("sort -o/--compress-program")
        }
        "tree" if args.iter().any(|a| a == "-o") => denied("tree -o"),
        "rg" if args
            .iter()
            .any(|a| a.starts_with("--pre") || a.starts_with("--hostname-bin")) =>
        {
            denied("rg --pre/--hostname-bin")
        }
        _ => Ok(()),
    }
}

fn check_path_args<'a>(args: impl IntoIterator<Item = &'a String>) -> Result<()> {
    for token in args {
        let candidate = if token.starts_with('-') {
            match token.split_once('=') {
                Some((_, value)) => value,
                None => continue,
            }
        } else {
            token.as_str()
        };
        let slashed = candidate.replace('\\', "/");
        if slashed.starts_with('/') || slashed.starts_with('~') {
            return Err(ToolError::Unauthorized(format!(
                "absolute paths are not allowed: {token:?}"
            )));
        }
        if DOTDOT.is_match(&slashed) {
            return Err(ToolError::Unauthorized(format!(
                "path traversal is not allowed: {token:?}"
            )));
        }
    }
    Ok(())
}

/// grep/rg options whose value is the next token.
const SEARCH_VALUE_FLAGS: &[&str] = &[
    "-A", "-B", "-C", "-m", "-e", "-f", "-g", "-t", "-T", "-j", "-M", "-d", "-D", "--glob",
    "--iglob", "--type", "--type-not", "--max-count", "--regexp", "--file", "--context",
    "--after-context", "--before-context", "--max-columns", "--threads", "--include",
    "--exclude", "--exclude-dir",
];

/// Separates search patterns from everything else. Patterns are free text,
/// so only the remaining tokens are path-checked.
fn split_search_args(args: &[String]) -> (Vec<&String>, Vec<&String>) {
    let explicit = args
        .iter()
        .any(|a| a == "-e" || a == "--regexp" || a.starts_with("--regexp="));
    let mut patterns = Vec::new();
    let mut operands = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--" {
            if !explicit && patterns.is_empty() {
                patterns.extend(iter.next());
            }
            operands.extend(iter.by_ref());
            break;
        }
        if SEARCH_VALUE_FLAGS.contains(&arg.as_str()) {
            if let Some(value) = iter.next() {
                if arg == "-e" || arg == "--regexp" {
                    patterns.push(value);
                } else {
                    operands.push(value);
                }
            }
            continue;
        }
        if arg.starts_with("--regexp=") {
            patterns.push(arg);
            continue;
        }
        if arg.starts_with('-') && arg.len() > 1 {
            operands.push(arg);
            continue;
        }
        if !explicit && patterns.is_empty() {
            patterns.push(arg);
        } else {
            operands.push(arg);
        }
    }
    (patterns, operands)
}

/// Splits sed arguments into scripts and file operands. Script files and
/// in-place editing are refused, including inside short-option clusters.
fn split_sed_args(args: &[String]) -> Result<(Vec<&str>, Vec<&String>)> {
    let explicit = args.iter().any(|a| {
        a == "--expression"
            || a.starts_with("--expression=")
            || (is_short_cluster(a) && a.contains('e'))
    });
    let mut scripts = Vec::new();
    let mut operands = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--file" || arg.starts_with("--file=") {
            return Err(ToolError::Unauthorized("sed -f is not allowed".to_string()));
        }
        if arg == "--expression" {
            scripts.extend(iter.next().map(String::as_str));
            continue;
        }
        if let Some(script) = arg.strip_prefix("--expression=") {
            scripts.push(script);
            continue;
        }
        if is_short_cluster(arg) {
            // `-ne script` or `-es/a/b/`: whatever follows `e` is the script.
            for (idx, flag) in arg.char_indices().skip(1) {
                match flag {
                    'f' => return Err(ToolError::Unauthorized("sed -f is not allowed".to_string())),
                    'i' => return Err(ToolError::Unauthorized("sed -i is not allowed".to_string())),
                    'e' => {
                        let attached = &arg[idx + 1..];
                        if attached.is_empty() {
                            scripts.extend(iter.next().map(String::as_str));
                        } else {
                            scripts.push(attached);
                        }
                        break;
                    }
                    _ => {}
                }
            }
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        if !explicit && scripts.is_empty() {
            scripts.push(arg.as_str());
        } else {
            operands.push(arg);
        }
    }
    Ok((scripts, operands))
}

fn is_short_cluster(arg: &str) -> bool {
    arg.len() > 1 && arg.starts_with('-') && !arg.starts_with("--")
}

/// Accepts the sed commands that only print or transform the stream.
/// `w`, `W`, `r`, `R` and `e` (and the `w`/`e` flags of `s`) touch files or
/// run programs and are refused, as is anything unrecognised.
fn check_sed_script(script: &str) -> Result<()> {
    let denied = |what: String| Err(ToolError::Unauthorized(format!("sed {what} is not allowed")));
    let chars: Vec<char> = script.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        // Address: line numbers, `$`, ranges, steps and /regex/ matches.
        loop {
            match chars.get(i) {
                Some(&c)
                    if c.is_ascii_digit()
                        || matches!(c, '$' | ',' | '~' | '+' | '!' | ' ' | '{' | '}') =>
                {
                    i += 1
                }
                Some('/') => i = skip_delimited(&chars, i + 1, '/')?,
                Some('\\') => match chars.get(i + 1) {
                    Some(&d) => i = skip_delimited(&chars, i + 2, d)?,
                    None => return denied("trailing backslash".to_string()),
                },
                Some('I' | 'M') if i > 0 && chars[i - 1] == '/' => i += 1,
                _ => break,
            }
        }
        let Some(&cmd) = chars.get(i) else { break };
        i += 1;
        match cmd {
            's' => {
                let Some(&d) = chars.get(i) else {
                    return denied("incomplete s command".to_string());
                };
                i = skip_delimited(&chars, i + 1, d)?;
                i = skip_delimited(&chars, i, d)?;
                while let Some(&flag) = chars.get(i) {
                    match flag {
                        'w' | 'W' | 'e' => return denied(format!("s///{flag}")),
                        'g' | 'p' | 'i' | 'I' | 'm' | 'M' => i += 1,
                        c if c.is_ascii_digit() => i += 1,
                        _ => break,
                    }
                }
            }
            'y' => {
                let Some(&d) = chars.get(i) else {
                    return denied("incomplete y command".to_string());
                };
                i = skip_delimited(&chars, i + 1, d)?;
                i = skip_delimited(&chars, i, d)?;
            }
            // Text and label arguments run to the end of the script.
            'a' | 'i' | 'c' | ':' | 'b' | 't' | 'T' => break,
            'q' | 'Q' | 'l' | 'L' => {
                while chars.get(i).is_some_and(char::is_ascii_digit) {
                    i += 1;
                }
            }
            'p' | 'P' | 'n' | 'N' | 'd' | 'D' | '=' | 'g' | 'G' | 'h' | 'H' | 'x' | 'z' | 'F' => {}
            'w' | 'W' | 'r' | 'R' | 'e' => return denied(format!("{cmd} command")),
            other => return denied(format!("command {other:?}")),
        }
    }
    Ok(())
}

/// Index just past the next unescaped `delim` at or after `start`.
fn skip_delimited(chars: &[char], start: usize, delim: char) -> Result<usize> {
    let mut i = start;
    while let Some(&c) = chars.get(i) {
        if c == '\\' {
            i += 2;
            continue;
        }
        if c == delim {
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(ToolError::InvalidArguments(format!(
        "unterminated {delim:?} in sed script"
    )))
}

/// Returns the awk operands, leaving out the program text. Program files,
/// extensions, and command execution or file reads from the program are
/// refused.
fn split_awk_args(args: &[String]) -> Result<Vec<&String>> {
    let denied = |what: &str| Err(ToolError::Unauthorized(format!("awk {what} is not allowed")));
    let mut operands = Vec::new();
    let mut program_seen = false;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if matches!(arg.as_str(), "-f" | "-E" | "-i" | "-l")
            || ["--file", "--exec", "--include", "--load"]
                .iter()
                .any(|long| arg.starts_with(long))
        {
            return denied(arg.as_str());
        }
        if arg == "-F" || arg == "-v" {
            operands.extend(iter.next());
            continue;
        }
        if arg.starts_with('-') && arg.len() > 1 {
            operands.push(arg);
            continue;
        }
        if program_seen {
            operands.push(arg);
            continue;
        }
        program_seen = true;
        for word in ["system", "getline"] {
            if arg.contains(word) {
                return denied(word);
            }
        }
    }
    Ok(operands)
}

fn tokenize_quoted(raw: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in raw.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if quote.is_some() {
        return Err(ToolError::InvalidArguments(
            "unterminated quote in command".to_string(),
        ));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn truncate_output(mut out: String) -> String {
    if out.len() <= OUTPUT_BYTES_MAX {
        return out;
    }
    let mut cut = OUTPUT_BYTES_MAX;
    while !out.is_char_boundary(cut) {
        cut -= 1;
    }
    let dropped = out.len() - cut;
    out.truncate(cut);
    out.push_str(&format!("\n[output truncated: {dropped} more bytes]"));
    out
}

/// Runs validated command lines inside the project root with a timeout.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    root: PathBuf,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    /// Combined stdout and stderr. A non-zero exit is not an error: search
    /// tools use it to mean "no matches".
    pub async fn run(&self, command: &CommandLine) -> Result<String> {
        let started = Instant::now();
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                ToolError::ExecutionFailed(format!(
                    "command timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ToolError::ExecutionFailed(format!("command not found: {}", command.program))
                }
                _ => ToolError::ExecutionFailed(e.to_string()),
            })?;

        let code = output.status.code().unwrap_or(-1);
        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        tracing::debug!(
            program = %command.program,
            exit_code = code,
            output_len = text.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "command finished"
        );

        if text.trim().is_empty() {
            return Ok(format!("The command produced no output (exit status {code})."));
        }
        Ok(truncate_output(text))
    }
}

pub struct BashTool {
    runner: CommandRunner,
}

impl BashTool {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "bash".to_string(),
            description: format!(
                "Run a read-only inspection command in the project root. No shell: arguments are split on whitespace, quoting, pipes, redirects and variables are not supported. Paths must be relative to the project root. Allowed commands: {}.",
                ALLOWED_COMMANDS.join(", ")
            ),
            parameters_schema: serde_json::json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "cmd": { "type": "string", "description": "For example: ls -la src" }
                },
                "required": ["cmd"]
            }),
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, arguments: serde_json::Value) -> Result<String> {
        let raw = require_string(&arguments, "cmd")?;
        let command = parse_bash_command(&raw)?;
        self.runner.run(&command).await
    }
}

pub struct GrepTool {
    runner: CommandRunner,
    sandbox: Sandbox,
}

impl GrepTool {
    pub fn new(runner: CommandRunner, sandbox: Sandbox) -> Self {
        Self { runner, sandbox }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "grep".to_string(),
            description: "Search the project with grep or rg, run from the project root. Ignored directories and files are excluded automatically. Quote patterns that contain spaces.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "cmd": { "type": "string", "description": "For example: grep -rn \"fn main\" ." }
                },
                "required": ["cmd"]
            }),
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, arguments: serde_json::Value) -> Result<String> {
        let raw = require_string(&arguments, "cmd")?;
        let command = parse_search_command(&raw, self.sandbox.rules())?;
        self.runner.run(&command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bash_accepts_allowlisted_inspection() {
        let cmd = parse_bash_command("  ls -la src ").unwrap();
        assert_eq!(cmd.program, "ls");
        assert_eq!(cmd.args, vec!["-la", "src"]);
    }

    #[test]
    fn bash_rejects_metacharacters_and_unknown_commands() {
        for raw in ["ls; rm -rf x", "cat a | wc", "echo $HOME", "ls > out", "cat `x`", "ls &"] {
            assert!(
                matches!(parse_bash_command(raw), Err(ToolError::Unauthorized(_))),
                "{raw}"
            );
        }
        let err = parse_bash_command("rm -rf src").unwrap_err();
        assert!(err.to_string().contains("\"rm\" is not allowed"));
        assert!(parse_bash_command("   ").is_err());
    }

    #[test]
    fn bash_rejects_write_flags() {
        assert!(parse_bash_command("sed -i s/a/b/ f.txt").is_err());
        assert!(parse_bash_command("sed --in-place=.bak s/a/b/ f.txt").is_err());
        assert!(parse_bash_command("find . -name x -delete").is_err());
        assert!(parse_bash_command("find . -exec cat").is_err());
        assert!(parse_bash_command("sort -o out.txt in.txt").is_err());
        assert!(parse_bash_command("sed -n 1,5p f.txt").is_ok());
    }

    #[test]
    fn bash_rejects_absolute_and_traversal_paths() {
        for raw in ["cat /etc/passwd", "cat ../secret", "ls src/../..", "cat ~/x", "grep --file=/etc/x a"] {
            assert!(parse_bash_command(raw).is_err(), "{raw}");
        }
        assert!(parse_bash_command("ls ..hidden").is_ok());
    }

    #[test]
    fn search_appends_exclusions_per_tool() {
        let rules = IgnoreRules::with_defaults();
        let grep = parse_search_command("grep -rn \"fn main\" .", &rules).unwrap();
        assert_eq!(&grep.args[grep.args.len() - 3..], &["-rn", "fn main", "."]);
        assert!(grep.args.contains(&"--exclude-dir=node_modules".to_string()));
        assert!(grep.args.contains(&"--exclude=*.log".to_string()));

        let rg = parse_search_command("rg 'a b' src", &rules).unwrap();
        assert_eq!(&rg.args[rg.args.len() - 2..], &["a b", "src"]);
        assert!(rg.args.contains(&"--glob=!.git".to_string()));
    }

    #[test]
    fn search_only_runs_search_programs() {
        let rules = IgnoreRules::empty();
        assert!(parse_search_command("cat x", &rules).is_err());
        assert!(parse_search_command("rg --pre=sh x", &rules).is_err());
        assert!(parse_search_command("grep 'open", &rules).is_err());
        assert!(parse_search_command("grep -r x ../", &rules).is_err());
        assert!(parse_search_command("grep -f /etc/x pat .", &rules).is_err());
    }

    #[test]
    fn search_patterns_may_contain_slashes() {
        let rules = IgnoreRules::empty();
        let grep = parse_search_command("grep -rn \"// TODO\" .", &rules).unwrap();
        assert_eq!(grep.args, vec!["-rn", "// TODO", "."]);
        assert!(parse_search_command("rg /api/users src", &rules).is_ok());
        assert!(parse_search_command("grep -e /x -r .", &rules).is_ok());
        assert!(parse_search_command("grep -r -- ../up .", &rules).is_ok());
        assert!(parse_search_command("grep -e x -r /etc", &rules).is_err());
        assert!(parse_bash_command("grep -rn /api/users src").is_ok());
    }

    #[test]
    fn sed_scripts_cannot_write_read_or_execute() {
        for raw in [
            "sed -n w/tmp/leak.txt f.txt",
            "sed 1e/usr/bin/id f.txt",
            "sed s/a/b/w out.txt f.txt",
            "sed s/a/b/e f.txt",
            "sed -e r/etc/passwd f.txt",
            "sed -f script.sed f.txt",
            "sed --file=script.sed f.txt",
            "sed -nf script.sed f.txt",
            "sed -ni s/a/b/ f.txt",
            "sed /x/W/tmp/out f.txt",
        ] {
            assert!(
                matches!(parse_bash_command(raw), Err(ToolError::Unauthorized(_))),
                "{raw}"
            );
        }
        for raw in ["sed -n 1,5p f.txt", "sed -n /main/p src/a.rs", "sed s/a/b/g f.txt"] {
            let ok = parse_bash_command(raw);
            assert!(ok.is_ok(), "{raw}: {ok:?}");
        }
        assert!(parse_bash_command("sed -e 10q -e s,x,y, f.txt").is_ok());
        assert!(parse_bash_command("sed -n s/a/../p f.txt").is_ok());
        assert!(parse_bash_command("sed -n 1p /etc/passwd").is_err());
    }

    #[test]
    fn awk_programs_cannot_load_files_or_run_commands() {
        for raw in [
            "awk -f prog.awk f.txt",
            "awk --file=prog.awk f.txt",
            "awk -E prog.awk",
            "awk {system} f.txt",
            "awk {getline} f.txt",
            "awk -F: {print} /etc/passwd",
        ] {
            assert!(parse_bash_command(raw).is_err(), "{raw}");
        }
        assert!(parse_bash_command("awk -F: {print} f.txt").is_ok());
        assert!(parse_bash_command("awk -F , /fn/ src/a.rs").is_ok());
    }

    #[test]
    fn output_is_truncated_on_char_boundary() {
        let long = "é".repeat(OUTPUT_BYTES_MAX);
        let out = truncate_output(long);
        assert!(out.contains("[output truncated"));
        assert!(out.len() < OUTPUT_BYTES_MAX + 64);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runner_executes_in_root_without_shell() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("hello.txt"), "hi there\n").unwrap();
        let runner = CommandRunner::new(tmp.path(), Duration::from_secs(5));
        let tool = BashTool::new(runner);
        let out = tool
            .execute(serde_json::json!({ "cmd": "cat hello.txt" }))
            .await
            .unwrap();
        assert_eq!(out, "hi there\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn grep_without_matches_is_not_a_failure() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "alpha\n").unwrap();
        let sandbox = Sandbox::new(tmp.path(), IgnoreRules::with_defaults()).unwrap();
        let runner = CommandRunner::new(sandbox.root(), Duration::from_secs(5));
        let tool = GrepTool::new(runner, sandbox);
        let out = tool
            .execute(serde_json::json!({ "cmd": "grep -rn zzz_not_there ." }))
            .await
            .unwrap();
        assert!(out.contains("exit status 1"), "{out}");
    }
}
