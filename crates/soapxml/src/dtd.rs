/*
 * dtd.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * DOCTYPE and DTD subset inspection.
 *
 * Declarations are collected for policy checks only. Entity values are kept
 * as written and never expanded into the document.
 */

/// A parsed `<!DOCTYPE ...>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctypeDecl {
    pub root_name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    /// Raw text between `[` and `]`, if present.
    pub internal_subset: Option<String>,
}

impl DoctypeDecl {
    /// The declaration as written, without its internal subset.
    pub fn to_doctype_string(&self) -> String {
        match (&self.public_id, &self.system_id) {
            (Some(public_id), Some(system_id)) => format!(
                r#"<!DOCTYPE {} PUBLIC "{}" "{}">"#,
                self.root_name, public_id, system_id
            ),
            (Some(public_id), None) => {
                format!(r#"<!DOCTYPE {} PUBLIC "{}">"#, self.root_name, public_id)
            }
            (None, Some(system_id)) => {
                format!(r#"<!DOCTYPE {} SYSTEM "{}">"#, self.root_name, system_id)
            }
            (None, None) => format!("<!DOCTYPE {}>", self.root_name),
        }
    }
}

/// An `<!ENTITY ...>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDecl {
    pub name: String,
    /// Declared with `%`.
    pub parameter: bool,
    /// Replacement text of an internal entity, unexpanded.
    pub value: Option<String>,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    /// Notation of an unparsed entity (`NDATA`).
    pub notation: Option<String>,
}

impl EntityDecl {
    pub fn is_external(&self) -> bool {
        self.system_id.is_some()
    }

    /// Declared replacement text, `None` for external entities.
    pub fn content(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// Declarations collected from one DTD subset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dtd {
    entities: Vec<EntityDecl>,
}

impl Dtd {
    /// Parse the markup declarations of an internal or external subset.
    pub fn parse(subset: &str) -> Result<Dtd, DtdError> {
        let mut scanner = Scanner::new(subset);
        let mut dtd = Dtd::default();

        loop {
            scanner.skip_ws();
            if scanner.at_end() {
                return Ok(dtd);
            }
            if scanner.eat("<!--") {
                scanner.skip_past("-->", "Comment not terminated")?;
            } else if scanner.eat("<?") {
                scanner.skip_past("?>", "Processing instruction not terminated")?;
            } else if scanner.eat("<!ENTITY") {
                let entity = scanner.entity_decl()?;
                dtd.entities.push(entity);
            } else if scanner.eat("<![") {
                // Conditional sections are skipped whole; INCLUDE sections are
                // only meaningful through parameter entities, which stay unexpanded.
                scanner.skip_past("]]>", "Conditional section not terminated")?;
            } else if scanner.eat("<!") {
                scanner.skip_declaration()?;
            } else if scanner.eat("%") {
                scanner.name()?;
                scanner.expect(";", "PEReference: expecting ';'")?;
            } else {
                return Err(scanner.error("Content error in the DTD"));
            }
        }
    }

    /// Entity declarations in declaration order.
    pub fn iter_entities(&self) -> impl Iterator<Item = &EntityDecl> {
        self.entities.iter()
    }

    pub fn has_entities(&self) -> bool {
        !self.entities.is_empty()
    }
}

/// Error from DOCTYPE or DTD parsing, with the byte offset into the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtdError {
    pub message: String,
    pub offset: usize,
}

impl std::fmt::Display for DtdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at byte {}", self.message, self.offset)
    }
}

impl std::error::Error for DtdError {}

/// Parse the body of a DOCTYPE declaration (the text after `<!DOCTYPE`).
pub fn parse_doctype(body: &str) -> Result<DoctypeDecl, DtdError> {
    let mut scanner = Scanner::new(body);
    scanner.skip_ws();
    let decl = scanner.doctype_body()?;

    if !scanner.at_end() && !scanner.eat(">") {
        return Err(scanner.error("DOCTYPE improperly terminated"));
    }
    Ok(decl)
}

/// Parse the `<!DOCTYPE ...>` declaration at the start of `text`.
///
/// Returns the declaration and the length of `text` it spans, up to and
/// including the closing `>`. A `>` inside a quoted literal, comment or
/// processing instruction of the internal subset does not end it.
pub fn scan_doctype(text: &str) -> Result<(DoctypeDecl, usize), DtdError> {
    const KEYWORD: &str = "<!DOCTYPE";

    let Some(body) = text.strip_prefix(KEYWORD) else {
        return Err(DtdError {
            message: "DOCTYPE expected".to_string(),
            offset: 0,
        });
    };
    let mut scanner = Scanner::new(body);
    let shift = |mut err: DtdError| {
        err.offset += KEYWORD.len();
        err
    };

    scanner
        .require_ws("Space required after 'DOCTYPE'")
        .map_err(shift)?;
    let decl = scanner.doctype_body().map_err(shift)?;
    scanner
        .expect(">", "DOCTYPE improperly terminated")
        .map_err(shift)?;
    Ok((decl, KEYWORD.len() + scanner.pos))
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    /// Root name, external id and internal subset, with trailing whitespace.
    fn doctype_body(&mut self) -> Result<DoctypeDecl, DtdError> {
        let root_name = self.name()?.to_string();
        self.skip_ws();
        let (public_id, system_id) = self.external_id()?;
        self.skip_ws();

        let internal_subset = if self.eat("[") {
            let start = self.pos;
            self.skip_internal_subset()?;
            let subset = self.src[start..self.pos - 1].to_string();
            self.skip_ws();
            Some(subset)
        } else {
            None
        };

        Ok(DoctypeDecl {
            root_name,
            public_id,
            system_id,
            internal_subset,
        })
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn error(&self, message: &str) -> DtdError {
        DtdError {
            message: message.to_string(),
            offset: self.pos,
        }
    }

    fn skip_ws(&mut self) -> bool {
        let rest = self.rest();
        let trimmed = rest.trim_start_matches([' ', '\t', '\r', '\n']);
        self.pos += rest.len() - trimmed.len();
        rest.len() != trimmed.len()
    }

    fn require_ws(&mut self, message: &str) -> Result<(), DtdError> {
        if self.skip_ws() {
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str, message: &str) -> Result<(), DtdError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn skip_past(&mut self, terminator: &str, message: &str) -> Result<(), DtdError> {
        match self.rest().find(terminator) {
            Some(idx) => {
                self.pos += idx + terminator.len();
                Ok(())
            }
            None => Err(self.error(message)),
        }
    }

    fn name(&mut self) -> Result<&'a str, DtdError> {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|&(i, c)| !is_name_char(c) || (i == 0 && !is_name_start_char(c)))
            .map_or(rest.len(), |(i, _)| i);
        if len == 0 {
            return Err(self.error("Name expected"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn quoted(&mut self) -> Result<&'a str, DtdError> {
        let rest = self.rest();
        let quote = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("Quoted literal expected")),
        };
        match rest[1..].find(quote) {
            Some(end) => {
                self.pos += end + 2;
                Ok(&rest[1..end + 1])
            }
            None => Err(self.error("Unfinished quoted literal")),
        }
    }

    /// `SYSTEM "sys"` or `PUBLIC "pub" "sys"`; nothing if neither keyword follows.
    fn external_id(&mut self) -> Result<(Option<String>, Option<String>), DtdError> {
        if self.eat("SYSTEM") {
            self.require_ws("Space required after 'SYSTEM'")?;
            let system_id = self.quoted()?.to_string();
            Ok((None, Some(system_id)))
        } else if self.eat("PUBLIC") {
            self.require_ws("Space required after 'PUBLIC'")?;
            let public_id = self.quoted()?.to_string();
            self.require_ws("Space required after the public identifier")?;
            let system_id = self.quoted()?.to_string();
            Ok((Some(public_id), Some(system_id)))
        } else {
            Ok((None, None))
        }
    }

    fn entity_decl(&mut self) -> Result<EntityDecl, DtdError> {
        self.require_ws("Space required after '<!ENTITY'")?;
        let parameter = self.eat("%");
        if parameter {
            self.require_ws("Space required after '%'")?;
        }
        let name = self.name()?.to_string();
        self.require_ws("Space required after the entity name")?;

        let mut entity = EntityDecl {
            name,
            parameter,
            value: None,
            public_id: None,
            system_id: None,
            notation: None,
        };

        if matches!(self.rest().chars().next(), Some('"' | '\'')) {
            entity.value = Some(self.quoted()?.to_string());
        } else {
            let (public_id, system_id) = self.external_id()?;
            if system_id.is_none() {
                return Err(self.error("Entity value or external identifier expected"));
            }
            entity.public_id = public_id;
            entity.system_id = system_id;

            let had_ws = self.skip_ws();
            if had_ws && self.eat("NDATA") {
                self.require_ws("Space required after 'NDATA'")?;
                entity.notation = Some(self.name()?.to_string());
            }
        }

        self.skip_ws();
        self.expect(">", "EntityDecl: entity not terminated")?;
        Ok(entity)
    }

    /// Skip a non-entity markup declaration, honouring quoted literals.
    fn skip_declaration(&mut self) -> Result<(), DtdError> {
        let mut quote: Option<char> = None;
        for (i, c) in self.rest().char_indices() {
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None if c == '"' || c == '\'' => quote = Some(c),
                None if c == '>' => {
                    self.pos += i + 1;
                    return Ok(());
                }
                None => {}
            }
        }
        Err(self.error("Markup declaration not terminated"))
    }

    /// Advance past the `]` closing an internal subset.
    ///
    /// Quoted literals, comments and processing instructions are opaque.
    fn skip_internal_subset(&mut self) -> Result<(), DtdError> {
        let mut quote: Option<char> = None;
        let mut resume = 0;
        let rest = self.rest();
        for (i, c) in rest.char_indices() {
            if i < resume {
                continue;
            }
            let opaque = match quote {
                Some(_) => None,
                None if rest[i..].starts_with("<!--") => Some(("<!--", "-->")),
                None if rest[i..].starts_with("<?") => Some(("<?", "?>")),
                None => None,
            };
            if let Some((open, close)) = opaque {
                let body = i + open.len();
                match rest[body..].find(close) {
                    Some(end) => resume = body + end + close.len(),
                    None => {
                        self.pos += i;
                        return Err(self.error("Internal subset not terminated"));
                    }
                }
                continue;
            }
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None if c == '"' || c == '\'' => quote = Some(c),
                None if c == ']' => {
                    self.pos += i + 1;
                    return Ok(());
                }
                None => {}
            }
        }
        Err(self.error("Internal subset not terminated"))
    }
}

pub(crate) fn is_name_start_char(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == ':'
}

pub(crate) fn is_name_char(c: char) -> bool {
    is_name_start_char(c) || c.is_numeric() || matches!(c, '-' | '.' | '\u{B7}')
}
