//! Performance rules

use crate::models::{Category, RuleScope, Severity};
use crate::parsers::DeclKind;
use crate::rules::{FileContext, Rule, RuleMeta};
use anyhow::Result;

/// Blocking calls that stall the event loop
const SYNC_IO_CALLS: &[&str] = &[
    "readFileSync",
    "writeFileSync",
    "appendFileSync",
    "existsSync",
    "readdirSync",
    "statSync",
    "lstatSync",
    "mkdirSync",
    "rmSync",
    "unlinkSync",
    "copyFileSync",
    "execSync",
    "execFileSync",
    "spawnSync",
    "pbkdf2Sync",
    "scryptSync",
];

/// Request-handling class kinds
const HANDLER_KINDS: &[DeclKind] = &[DeclKind::Controller, DeclKind::Resolver, DeclKind::Gateway];

/// Flags synchronous I/O inside request handlers
pub struct SyncIoInHandler {
    meta: RuleMeta,
}

impl SyncIoInHandler {
    pub fn new() -> Self {
        Self {
            meta: RuleMeta::new(
                "performance/sync-io-in-handler",
                Category::Performance,
                Severity::Warning,
                RuleScope::File,
                "synchronous I/O in a request handler",
                "Use the async variant (fs/promises, exec with a callback) or move the work to a service",
            ),
        }
    }
}

impl Default for SyncIoInHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for SyncIoInHandler {
    fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    fn check_file(&self, ctx: &FileContext<'_>) -> Result<()> {
        let facts = ctx.facts();
        for call in &facts.calls {
            let name = call.callee.rsplit('.').next().unwrap_or(&call.callee);
            if !SYNC_IO_CALLS.contains(&name) || call.method.is_none() {
                continue;
            }
            let in_handler = call
                .class
                .as_deref()
                .and_then(|c| facts.class(c))
                .map(|c| HANDLER_KINDS.iter().any(|k| c.is(*k)))
                .unwrap_or(false);
            if in_handler {
                ctx.report(
                    call.line,
                    call.column,
                    format!(
                        "{}() blocks the event loop inside {}",
                        name,
                        call.method.as_deref().unwrap_or("a handler")
                    ),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::builtin::run_rule;
    use crate::rules::RuleSettings;
    use std::sync::Arc;

    #[test]
    fn test_sync_io_only_in_handlers() {
        let diagnostics = run_rule(
            Arc::new(SyncIoInHandler::new()),
            RuleSettings::default(),
            &[
                (
                    "src/files.controller.ts",
                    r#"
@Controller('files')
export class FilesController {
    @Get()
    list() {
        return fs.readdirSync('/tmp');
    }
}
"#,
                ),
                (
                    "src/files.service.ts",
                    r#"
@Injectable()
export class FilesService {
    load() {
        return fs.readFileSync('a');
    }
}
"#,
                ),
            ],
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].file_path, "src/files.controller.ts");
        assert_eq!(diagnostics[0].line, 6);
        assert!(diagnostics[0].message.contains("readdirSync"));
    }
}
