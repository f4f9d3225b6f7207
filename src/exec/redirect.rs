use std::{
    fs::{File, OpenOptions},
    os::fd::OwnedFd,
    os::unix::fs::OpenOptionsExt,
    path::PathBuf,
};

use crate::common::Error;
use crate::parse::Token;

/// The descriptors a command's redirections resolved to. `None` means the
/// stream is inherited from the shell.
pub(crate) struct Redirections {
    pub(crate) stdin: Option<OwnedFd>,
    pub(crate) stdout: Option<OwnedFd>,
}

impl Redirections {
    /// Consume every `< file` / `> file` pair in `tokens`, open the files,
    /// and compact the vector so only `argv` words remain.
    ///
    /// The files are opened in the shell process. On failure nothing has been
    /// forked yet and any descriptor opened by an earlier pair is closed on
    /// the way out.
    pub(crate) fn extract(tokens: &mut Vec<Token>) -> Result<Self, Error> {
        let mut redirections = Self {
            stdin: None,
            stdout: None,
        };

        let mut i = 0;
        while i < tokens.len() {
            let input = match tokens[i] {
                Token::RedirIn => true,
                Token::RedirOut => false,
                _ => {
                    i += 1;
                    continue;
                }
            };

            let Some(Token::Word(path)) = tokens.get(i + 1) else {
                return Err(Error::MalformedRedirection);
            };

            // A repeated direction closes the earlier descriptor before the
            // later file is opened.
            let file = if input {
                redirections.stdin.take();
                File::open(path)
            } else {
                redirections.stdout.take();
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .mode(0o644)
                    .open(path)
            }
            .map_err(|err| Error::RedirectOpen(PathBuf::from(path), err))?;

            if input {
                redirections.stdin = Some(file.into());
            } else {
                redirections.stdout = Some(file.into());
            }

            tokens.drain(i..i + 2);
        }

        Ok(redirections)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use pretty_assertions::assert_eq;

    use super::Redirections;
    use crate::common::Error;
    use crate::parse::{tokenize, Token};

    #[test]
    fn extract_compacts_the_token_vector() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        std::fs::write(&input, "hello\n").unwrap();
        let output = dir.path().join("out");

        let line = format!("cat < {} -n > {}", input.display(), output.display());
        let mut tokens = tokenize(&line);
        let redirections = Redirections::extract(&mut tokens).unwrap();

        assert_eq!(
            tokens,
            vec![Token::Word("cat".into()), Token::Word("-n".into())]
        );

        let mut contents = String::new();
        let mut stdin: std::fs::File = redirections.stdin.unwrap().into();
        stdin.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "hello\n");

        let mut stdout: std::fs::File = redirections.stdout.unwrap().into();
        stdout.write_all(b"x").unwrap();
        assert!(output.exists());
    }

    #[test]
    fn later_redirection_of_same_direction_wins() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        std::fs::write(&first, "1").unwrap();
        std::fs::write(&second, "2").unwrap();

        let line = format!("cat < {} < {}", first.display(), second.display());
        let mut tokens = tokenize(&line);
        let redirections = Redirections::extract(&mut tokens).unwrap();

        let mut stdin: std::fs::File = redirections.stdin.unwrap().into();
        let mut contents = String::new();
        stdin.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "2");
    }

    #[test]
    fn output_files_are_created_but_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::write(&out, "old contents").unwrap();

        let line = format!("echo > {}", out.display());
        let mut tokens = tokenize(&line);
        let redirections = Redirections::extract(&mut tokens).unwrap();

        let mut file: std::fs::File = redirections.stdout.unwrap().into();
        file.write_all(b"new").unwrap();
        drop(file);

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "new contents");
    }

    #[test]
    fn operator_without_file_name_is_malformed() {
        for line in ["cat <", "cat >", "cat < < in", "cat > | wc"] {
            let mut tokens = tokenize(line);
            assert!(matches!(
                Redirections::extract(&mut tokens),
                Err(Error::MalformedRedirection)
            ));
        }
    }

    #[test]
    fn unopenable_target_is_reported_with_its_path() {
        let mut tokens = tokenize("cat < /nonexistent/nosuch");
        let err = Redirections::extract(&mut tokens).map(drop).unwrap_err();
        match err {
            Error::RedirectOpen(path, _) => {
                assert_eq!(path, std::path::PathBuf::from("/nonexistent/nosuch"));
            }
            other => panic!("expected RedirectOpen, got {other:?}"),
        }
    }
}
