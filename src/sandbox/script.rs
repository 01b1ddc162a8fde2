//! CallScript：内置的受限脚本语言
//!
//! ```text
//! # 注释
//! let mem = meminfo("MemAvailable")
//! let load = loadavg()
//! { "available_kb": mem, "load1": load.one, "first": [1, 2, 3][0] }
//! ```
//!
//! 语句以换行或 `;` 分隔；表达式为 JSON 字面量、变量、数组、对象、回调调用，
//! 以及 `.field` / `[index]` 取值。最后一条语句的值即结果（`let` 语句的值为所赋的值）。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::SandboxSection;
use crate::core::supervisor::panic_message;
use crate::sandbox::{Callbacks, SandboxError, SandboxEvaluator};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(Value),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Eq,
    Dot,
    /// 语句分隔（换行或 `;`）
    Sep,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    line: usize,
}

fn parse_err(line: usize, message: impl std::fmt::Display) -> SandboxError {
    SandboxError::Parse(format!("line {}: {}", line, message))
}

fn tokenize(src: &str) -> Result<Vec<Spanned>, SandboxError> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let single = match c {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            ',' => Some(Token::Comma),
            ':' => Some(Token::Colon),
            '=' => Some(Token::Eq),
            '.' => Some(Token::Dot),
            ';' | '\n' => Some(Token::Sep),
            _ => None,
        };
        if let Some(token) = single {
            out.push(Spanned { token, line });
            if c == '\n' {
                line += 1;
            }
            i += 1;
            continue;
        }

        match c {
            ' ' | '\t' | '\r' => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '"' => {
                let start = i;
                i += 1;
                loop {
                    match chars.get(i) {
                        None | Some('\n') => return Err(parse_err(line, "unterminated string")),
                        Some('\\') => i += 2,
                        Some('"') => break,
                        Some(_) => i += 1,
                    }
                }
                let literal: String = chars[start..=i].iter().collect();
                let s: String = serde_json::from_str(&literal)
                    .map_err(|e| parse_err(line, format!("bad string literal: {}", e)))?;
                out.push(Spanned {
                    token: Token::Str(s),
                    line,
                });
                i += 1;
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit() || matches!(chars[i], '.' | 'e' | 'E' | '+' | '-'))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value: Value = serde_json::from_str(&text)
                    .ok()
                    .filter(Value::is_number)
                    .ok_or_else(|| parse_err(line, format!("bad number: {}", text)))?;
                out.push(Spanned {
                    token: Token::Num(value),
                    line,
                });
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                out.push(Spanned {
                    token: Token::Ident(chars[start..i].iter().collect()),
                    line,
                });
            }
            other => return Err(parse_err(line, format!("unexpected character '{}'", other))),
        }
    }
    Ok(out)
}

#[derive(Debug, Clone)]
enum Expr {
    Lit(Value),
    Var(String),
    Call { name: String, args: Vec<Expr> },
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone)]
enum Stmt {
    Let(String, Expr),
    Expr(Expr),
}

/// 表达式最大嵌套深度（含 `.field` / `[index]` 链），超出即为解析错误
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, want: Token) -> Result<(), SandboxError> {
        let line = self.line();
        match self.next() {
            Some(ref got) if *got == want => Ok(()),
            Some(got) => Err(parse_err(line, format!("expected {:?}, found {:?}", want, got))),
            None => Err(parse_err(line, format!("expected {:?}, found end of script", want))),
        }
    }

    fn skip_separators(&mut self) {
        while self.peek() == Some(&Token::Sep) {
            self.pos += 1;
        }
    }

    fn program(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            if self.peek().is_none() {
                break;
            }
            stmts.push(self.statement()?);
            match self.peek() {
                None | Some(Token::Sep) => {}
                Some(other) => {
                    return Err(parse_err(
                        self.line(),
                        format!("expected end of statement, found {:?}", other),
                    ))
                }
            }
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, SandboxError> {
        if self.peek() == Some(&Token::Ident("let".to_string())) {
            self.pos += 1;
            let line = self.line();
            let name = match self.next() {
                Some(Token::Ident(name)) => name,
                _ => return Err(parse_err(line, "expected variable name after let")),
            };
            self.expect(Token::Eq)?;
            return Ok(Stmt::Let(name, self.expr()?));
        }
        Ok(Stmt::Expr(self.expr()?))
    }

    fn enter(&mut self) -> Result<(), SandboxError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(parse_err(self.line(), "nesting too deep"));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, SandboxError> {
        let outer = self.depth;
        let result = self.enter().and_then(|_| self.postfix());
        self.depth = outer;
        result
    }

    fn postfix(&mut self) -> Result<Expr, SandboxError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.enter()?;
                    self.pos += 1;
                    let line = self.line();
                    match self.next() {
                        Some(Token::Ident(field)) => expr = Expr::Field(Box::new(expr), field),
                        _ => return Err(parse_err(line, "expected field name after '.'")),
                    }
                }
                Some(Token::LBracket) => {
                    self.enter()?;
                    self.pos += 1;
                    let index = self.expr()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    /// 逗号分隔的列表，允许换行与末尾逗号
    fn list<T>(
        &mut self,
        close: Token,
        mut item: impl FnMut(&mut Self) -> Result<T, SandboxError>,
    ) -> Result<Vec<T>, SandboxError> {
        let mut items = Vec::new();
        loop {
            self.skip_separators();
            if self.peek() == Some(&close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(item(self)?);
            self.skip_separators();
            match self.next() {
                Some(Token::Comma) => {}
                Some(ref t) if *t == close => return Ok(items),
                _ => return Err(parse_err(self.line(), format!("expected ',' or {:?}", close))),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, SandboxError> {
        let line = self.line();
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Lit(Value::String(s))),
            Some(Token::Num(n)) => Ok(Expr::Lit(n)),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Lit(Value::Bool(true))),
                "false" => Ok(Expr::Lit(Value::Bool(false))),
                "null" => Ok(Expr::Lit(Value::Null)),
                _ if self.peek() == Some(&Token::LParen) => {
                    self.pos += 1;
                    let args = self.list(Token::RParen, |p| p.expr())?;
                    Ok(Expr::Call { name, args })
                }
                _ => Ok(Expr::Var(name)),
            },
            Some(Token::LBracket) => Ok(Expr::Array(self.list(Token::RBracket, |p| p.expr())?)),
            Some(Token::LBrace) => {
                let fields = self.list(Token::RBrace, |p| {
                    let line = p.line();
                    let key = match p.next() {
                        Some(Token::Str(k)) | Some(Token::Ident(k)) => k,
                        _ => return Err(parse_err(line, "expected object key")),
                    };
                    p.expect(Token::Colon)?;
                    Ok((key, p.expr()?))
                })?;
                Ok(Expr::Object(fields))
            }
            Some(other) => Err(parse_err(line, format!("unexpected token {:?}", other))),
            None => Err(parse_err(line, "unexpected end of script")),
        }
    }
}

struct Interpreter<'a> {
    callbacks: &'a Callbacks,
    vars: HashMap<String, Value>,
    steps: usize,
    max_steps: usize,
    deadline: Instant,
    timeout: Duration,
}

impl Interpreter<'_> {
    fn tick(&mut self) -> Result<(), SandboxError> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(SandboxError::StepLimit(self.max_steps));
        }
        if Instant::now() >= self.deadline {
            return Err(SandboxError::Timeout(self.timeout));
        }
        Ok(())
    }

    fn run(&mut self, program: &[Stmt]) -> Result<Value, SandboxError> {
        let mut last = Value::Null;
        for stmt in program {
            last = match stmt {
                Stmt::Let(name, expr) => {
                    let value = self.eval(expr)?;
                    self.vars.insert(name.clone(), value.clone());
                    value
                }
                Stmt::Expr(expr) => self.eval(expr)?,
            };
        }
        Ok(last)
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, SandboxError> {
        self.tick()?;
        match expr {
            Expr::Lit(v) => Ok(v.clone()),
            Expr::Var(name) => self
                .vars
                .get(name)
                .cloned()
                .ok_or_else(|| SandboxError::UndefinedVariable(name.clone())),
            Expr::Call { name, args } => {
                let f = self
                    .callbacks
                    .get(name)
                    .ok_or_else(|| SandboxError::UnknownFunction(name.clone()))?;
                let args = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>, _>>()?;
                let value = f(args).map_err(|message| SandboxError::Callback {
                    name: name.clone(),
                    message,
                })?;
                // 回调返回后再检查一次时限
                if Instant::now() >= self.deadline {
                    return Err(SandboxError::Timeout(self.timeout));
                }
                Ok(value)
            }
            Expr::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            Expr::Object(fields) => {
                let mut map = Map::new();
                for (key, e) in fields {
                    map.insert(key.clone(), self.eval(e)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Field(target, field) => {
                let target = self.eval(target)?;
                Ok(target.get(field).cloned().unwrap_or(Value::Null))
            }
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                let found = match &index {
                    Value::String(key) => target.get(key.as_str()),
                    Value::Number(n) => n.as_u64().and_then(|i| target.get(i as usize)),
                    _ => None,
                };
                Ok(found.cloned().unwrap_or(Value::Null))
            }
        }
    }
}

/// 同步执行（在阻塞线程池中调用）
fn run_script(
    script: &str,
    callbacks: &Callbacks,
    max_steps: usize,
    timeout: Duration,
) -> Result<Value, SandboxError> {
    let tokens = tokenize(script)?;
    let program = Parser {
        tokens,
        pos: 0,
        depth: 0,
    }
    .program()?;
    let mut interpreter = Interpreter {
        callbacks,
        vars: HashMap::new(),
        steps: 0,
        max_steps,
        deadline: Instant::now() + timeout,
        timeout,
    };
    interpreter.run(&program)
}

/// CallScript 求值器：阻塞线程池执行 + 外层 tokio 超时
#[derive(Debug, Clone)]
pub struct CallScriptEvaluator {
    max_steps: usize,
    timeout: Duration,
}

impl CallScriptEvaluator {
    pub fn new(max_steps: usize, timeout: Duration) -> Self {
        Self { max_steps, timeout }
    }

    pub fn from_config(cfg: &SandboxSection) -> Self {
        Self::new(cfg.max_steps, cfg.timeout())
    }
}

impl Default for CallScriptEvaluator {
    fn default() -> Self {
        Self::from_config(&SandboxSection::default())
    }
}

#[async_trait]
impl SandboxEvaluator for CallScriptEvaluator {
    async fn eval(&self, script: &str, callbacks: &Callbacks) -> Result<Value, SandboxError> {
        let script = script.to_string();
        let callbacks = callbacks.clone();
        let (max_steps, timeout) = (self.max_steps, self.timeout);

        let task = tokio::task::spawn_blocking(move || {
            run_script(&script, &callbacks, max_steps, timeout)
        });

        match tokio::time::timeout(timeout, task).await {
            Err(_) => Err(SandboxError::Timeout(timeout)),
            Ok(Err(join_err)) => Err(SandboxError::Panicked(panic_message(join_err))),
            Ok(Ok(result)) => result,
        }
    }
}
