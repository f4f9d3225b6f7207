//! The pipeline driver: splits the token vector into stages, threads pipe
//! ends between them and registers every stage under one job.

use std::os::fd::{BorrowedFd, OwnedFd};

use libc::c_int;

use crate::{
    common::Error,
    jobs::{self, CriticalSection, JobClass},
    parse::{self, Token},
    system::{pipe, ProcessId},
};

use super::{announce, launch_stage, Redirections};

struct Stage {
    argv: Vec<String>,
    redirections: Redirections,
}

/// Split on `|`. Every stage keeps its own redirection tokens; emptiness is
/// diagnosed later, once the redirections have been peeled off.
fn split_stages(tokens: Vec<Token>) -> Vec<Vec<Token>> {
    let mut stages = vec![Vec::new()];
    for token in tokens {
        if token == Token::Pipe {
            stages.push(Vec::new());
        } else {
            stages
                .last_mut()
                .expect("the stage list starts non-empty")
                .push(token);
        }
    }
    stages
}

/// Run a multi-stage command as one job.
///
/// All stage redirections are opened before the first fork, so a file that
/// cannot be opened aborts the pipeline while the shell still owns every
/// descriptor; the accumulated ones are closed on the way out.
pub(crate) fn run_pipeline(
    tty: BorrowedFd<'_>,
    tokens: Vec<Token>,
    background: bool,
) -> Result<c_int, Error> {
    let mut stages = Vec::new();
    for mut stage_tokens in split_stages(tokens) {
        let redirections = Redirections::extract(&mut stage_tokens)?;
        let argv = parse::into_words(stage_tokens)?;
        if argv.is_empty() {
            return Err(Error::Syntax("missing command in pipeline"));
        }
        stages.push(Stage {
            argv,
            redirections,
        });
    }

    let mut cs = CriticalSection::enter()?;

    let count = stages.len();
    let mut pgid = ProcessId::inherit();
    let mut job = None;
    let mut input: Option<OwnedFd> = None;

    for (i, stage) in stages.into_iter().enumerate() {
        let (next_input, output) = if i + 1 < count {
            let (read, write) = pipe().map_err(Error::Fatal)?;
            (Some(read), Some(write))
        } else {
            (None, None)
        };

        let Stage { argv, redirections } = stage;
        // A stage redirection replaces the adjacent pipe end, which is
        // dropped (closed) right here.
        let stdin_fd = redirections.stdin.or(input.take());
        let stdout_fd = redirections.stdout.or(output);

        let pid = launch_stage(pgid, cs.saved_mask(), stdin_fd, stdout_fd, tty, &argv)
            .map_err(Error::Fatal)?;
        // The parent now holds no descriptor of this stage: launch_stage
        // consumed both ends, and the child dup'd what it needed first.

        let id = *job.get_or_insert_with(|| {
            // The first stage's pid names the process group for the whole job.
            pgid = pid;
            let class = if background {
                JobClass::Background
            } else {
                JobClass::Foreground
            };
            cs.jobs().add_job(pid, class)
        });
        cs.jobs().add_proc(id, pid, &argv);

        input = next_input;
    }

    let id = job.expect("a pipeline has at least one stage");

    if background {
        announce(&mut cs, id);
        Ok(0)
    } else {
        Ok(jobs::monitor_foreground(&mut cs, &tty)?)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::split_stages;
    use crate::parse::{tokenize, Token};

    #[test]
    fn stages_split_on_pipe() {
        let stages = split_stages(tokenize("yes | head -n 3 | wc -l"));
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0], vec![Token::Word("yes".into())]);
        assert_eq!(
            stages[2],
            vec![Token::Word("wc".into()), Token::Word("-l".into())]
        );
    }

    #[test]
    fn empty_stages_are_preserved_for_diagnosis() {
        let stages = split_stages(tokenize("a | | b"));
        assert_eq!(stages.len(), 3);
        assert!(stages[1].is_empty());

        let stages = split_stages(tokenize("| a"));
        assert!(stages[0].is_empty());
    }

    #[test]
    fn redirections_stay_with_their_stage() {
        let stages = split_stages(tokenize("cat < in | wc > out"));
        assert_eq!(
            stages[0],
            vec![
                Token::Word("cat".into()),
                Token::RedirIn,
                Token::Word("in".into()),
            ]
        );
        assert_eq!(
            stages[1],
            vec![
                Token::Word("wc".into()),
                Token::RedirOut,
                Token::Word("out".into()),
            ]
        );
    }
}
