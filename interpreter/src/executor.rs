use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

use docscript::ast::{ExceptHandler, Stmt, StmtKind, Target};
use docscript::rewrite::PlainAsserts;

use crate::code::Code;
use crate::error::{DiagnosticError, RuntimeError, is_subclass};
use crate::evaluator::{Scope, binary_operation, compare};
use crate::explain;
use crate::modules;
use crate::namespace::Namespace;
use crate::runtime_value::{Function, Module, RuntimeValue};
use crate::traceback::Frame;

/// Maximum depth of nested function calls.
pub const MAX_DEPTH: usize = 64;

/// Control flow out of a statement.
#[derive(Debug)]
pub(crate) enum Flow {
    Normal,
    Return(RuntimeValue),
    Break,
    Continue,
}

/// A frame on the interpreter's call stack.
struct ActiveFrame {
    code: Rc<Code>,
    name: String,
    line: usize,
}

/// Executes compiled code against caller-supplied namespaces.
///
/// One interpreter is used per documentation file: imported modules are
/// cached on it, so a module imported by several blocks executes once.
pub struct Interpreter<'o> {
    pub(crate) output: &'o mut dyn Write,
    search_paths: Vec<PathBuf>,
    modules: HashMap<String, RuntimeValue>,
    frames: Vec<ActiveFrame>,
    /// Exceptions being handled by enclosing `except` clauses, for bare `raise`.
    handling: Vec<DiagnosticError>,
}

impl<'o> Interpreter<'o> {
    pub fn new(output: &'o mut dyn Write) -> Self {
        Interpreter {
            output,
            search_paths: Vec::new(),
            modules: HashMap::new(),
            frames: Vec::new(),
            handling: Vec::new(),
        }
    }

    /// Directories searched, in order, for `<module>.py` on import.
    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    /// Execute `code` as top-level code whose globals are `namespace`.
    pub fn exec(&mut self, code: Rc<Code>, namespace: &Namespace) -> Result<(), DiagnosticError> {
        let scope = Scope::module(namespace.clone());
        self.frames.push(ActiveFrame {
            code: code.clone(),
            name: "<module>".to_string(),
            line: 1,
        });
        let result = self.exec_block(&code.program.body, &scope);
        self.frames.pop();
        match result? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => Err(syntax_error(&code, "'return' outside function")),
            Flow::Break => Err(syntax_error(&code, "'break' outside loop")),
            Flow::Continue => Err(syntax_error(&code, "'continue' not properly in loop")),
        }
    }

    pub(crate) fn exec_block(&mut self, body: &[Stmt], scope: &Scope) -> Result<Flow, DiagnosticError> {
        for stmt in body {
            match self.exec_stmt(stmt, scope)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &Scope) -> Result<Flow, DiagnosticError> {
        self.set_line(stmt.line);
        self.exec_stmt_kind(stmt, scope).map_err(|mut err| {
            // The innermost statement an error passes through records the stack.
            if err.traceback.is_empty() {
                err.traceback = self.snapshot();
            }
            err
        })
    }

    fn exec_stmt_kind(&mut self, stmt: &Stmt, scope: &Scope) -> Result<Flow, DiagnosticError> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.eval(expr, scope)?;
            }
            StmtKind::Assignment { target, value } => {
                let value = self.eval(value, scope)?;
                self.assign(target, value, scope)?;
            }
            StmtKind::AugmentedAssignment {
                target,
                operator,
                value,
            } => match target {
                Target::Name(name) => {
                    let current = scope
                        .lookup(name)
                        .ok_or_else(|| RuntimeError::UndefinedVariable(name.clone()))?;
                    let rhs = self.eval(value, scope)?;
                    let result = binary_operation(*operator, &current, &rhs)?;
                    scope.locals.set(name.clone(), result);
                }
                Target::Subscript { value: container, index } => {
                    let container = self.eval(container, scope)?;
                    let index = self.eval(index, scope)?;
                    let current = crate::evaluator::get_item(&container, &index)?;
                    let rhs = self.eval(value, scope)?;
                    let result = binary_operation(*operator, &current, &rhs)?;
                    crate::evaluator::set_item(&container, index, result)?;
                }
                Target::Tuple(_) => {
                    return Err(RuntimeError::Custom(
                        "illegal expression for augmented assignment".into(),
                    )
                    .into());
                }
            },
            StmtKind::If { test, body, orelse } => {
                let branch = if self.eval(test, scope)?.is_truthy() {
                    body
                } else {
                    orelse
                };
                return self.exec_block(branch, scope);
            }
            StmtKind::While { test, body } => loop {
                self.set_line(stmt.line);
                if !self.eval(test, scope)?.is_truthy() {
                    break;
                }
                match self.exec_block(body, scope)? {
                    Flow::Break => break,
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                    Flow::Normal | Flow::Continue => {}
                }
            },
            StmtKind::For { target, iter, body } => {
                let iterable = self.eval(iter, scope)?;
                for item in crate::evaluator::iterate(&iterable)? {
                    self.assign(target, item, scope)?;
                    match self.exec_block(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::FunctionDef(def) => {
                let defaults = def
                    .parameters
                    .iter()
                    .map(|p| p.default.as_ref().map(|d| self.eval(d, scope)).transpose())
                    .collect::<Result<Vec<_>, _>>()?;
                let function = Function {
                    def: def.clone(),
                    defaults,
                    globals: scope.globals.clone(),
                    enclosing: scope.closure(),
                    code: self.current_code()?,
                };
                scope
                    .locals
                    .set(def.name.clone(), RuntimeValue::Function(Rc::new(function)));
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => RuntimeValue::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Import(names) => {
                for import in names {
                    let module = self.import(&import.name)?;
                    scope.locals.set(import.bound_name(), module);
                }
            }
            StmtKind::ImportFrom { module, names } => {
                let loaded = self.import(module)?;
                let RuntimeValue::Module(loaded) = loaded else {
                    return Err(RuntimeError::ImportError(format!("'{}' is not a module", module)).into());
                };
                for import in names {
                    let value = loaded.namespace.get(&import.name).ok_or_else(|| {
                        RuntimeError::ImportError(format!(
                            "cannot import name '{}' from '{}'",
                            import.name, module
                        ))
                    })?;
                    scope.locals.set(import.bound_name(), value);
                }
            }
            StmtKind::Assert { test, message } => {
                if !self.eval(test, scope)?.is_truthy() {
                    let message = match message {
                        Some(m) => Some(self.eval(m, scope)?.to_string()),
                        None => None,
                    };
                    return Err(RuntimeError::Assertion {
                        message,
                        explanation: Vec::new(),
                    }
                    .into());
                }
            }
            StmtKind::CheckedAssert(check) => {
                let (passed, operands) = match &check.comparison {
                    Some(comparison) => {
                        let left = self.eval(&comparison.left, scope)?;
                        let right = self.eval(&comparison.right, scope)?;
                        (compare(comparison.operator, &left, &right)?, Some((left, right)))
                    }
                    None => (self.eval(&check.test, scope)?.is_truthy(), None),
                };
                if !passed {
                    let message = match &check.message {
                        Some(m) => Some(self.eval(m, scope)?.to_string()),
                        None => None,
                    };
                    let explanation =
                        explain::explain(check, operands.as_ref().map(|(l, r)| (l, r)));
                    return Err(RuntimeError::Assertion {
                        message,
                        explanation,
                    }
                    .into());
                }
            }
            StmtKind::Raise(value) => {
                let Some(expr) = value else {
                    return Err(self.handling.last().cloned().unwrap_or_else(|| {
                        RuntimeError::Custom("No active exception to reraise".into()).into()
                    }));
                };
                let raised = match self.eval(expr, scope)? {
                    RuntimeValue::Exception(e) => (*e).clone(),
                    RuntimeValue::ExceptionType(kind) => crate::runtime_value::ExceptionValue {
                        kind,
                        message: String::new(),
                    },
                    other => {
                        return Err(RuntimeError::TypeError(format!(
                            "exceptions must derive from BaseException, not '{}'",
                            other.type_name()
                        ))
                        .into());
                    }
                };
                return Err(RuntimeError::from_exception(raised).into());
            }
            StmtKind::Try {
                body,
                handlers,
                finalbody,
            } => {
                let result = match self.exec_block(body, scope) {
                    Err(err) => self.handle(err, handlers, scope),
                    ok => ok,
                };
                if !finalbody.is_empty() {
                    self.set_line(stmt.line);
                    if let flow @ (Flow::Return(_) | Flow::Break | Flow::Continue) =
                        self.exec_block(finalbody, scope)?
                    {
                        return Ok(flow);
                    }
                }
                return result;
            }
            StmtKind::Pass => {}
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    /// Run the first handler matching `err`, or propagate it.
    fn handle(
        &mut self,
        err: DiagnosticError,
        handlers: &[ExceptHandler],
        scope: &Scope,
    ) -> Result<Flow, DiagnosticError> {
        let kind = err.error.kind().to_string();
        let Some(handler) = handlers
            .iter()
            .find(|h| h.kinds.is_empty() || h.kinds.iter().any(|k| is_subclass(&kind, k)))
        else {
            return Err(err);
        };
        log::trace!("caught {} in except clause", kind);
        if let Some(binding) = &handler.binding {
            scope.locals.set(
                binding.clone(),
                RuntimeValue::Exception(Rc::new(err.error.to_exception())),
            );
        }
        self.handling.push(err);
        let result = self.exec_block(&handler.body, scope);
        self.handling.pop();
        result
    }

    pub(crate) fn assign(
        &mut self,
        target: &Target,
        value: RuntimeValue,
        scope: &Scope,
    ) -> Result<(), DiagnosticError> {
        match target {
            Target::Name(name) => scope.locals.set(name.clone(), value),
            Target::Subscript { value: container, index } => {
                let container = self.eval(container, scope)?;
                let index = self.eval(index, scope)?;
                crate::evaluator::set_item(&container, index, value)?;
            }
            Target::Tuple(targets) => {
                let items = crate::evaluator::iterate(&value)?;
                if items.len() != targets.len() {
                    let message = if items.len() > targets.len() {
                        format!("too many values to unpack (expected {})", targets.len())
                    } else {
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        )
                    };
                    return Err(RuntimeError::ValueError(message).into());
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, scope)?;
                }
            }
        }
        Ok(())
    }

    /// Call a user-defined function.
    pub(crate) fn call_function(
        &mut self,
        function: &Rc<Function>,
        args: Vec<RuntimeValue>,
        keywords: Vec<(String, RuntimeValue)>,
    ) -> Result<RuntimeValue, DiagnosticError> {
        if self.frames.len() > MAX_DEPTH {
            return Err(RuntimeError::StackOverflow.into());
        }
        let def = &function.def;
        let params = &def.parameters;
        if args.len() > params.len() {
            return Err(RuntimeError::TypeError(format!(
                "{}() takes {} positional argument{} but {} {} given",
                def.name,
                params.len(),
                if params.len() == 1 { "" } else { "s" },
                args.len(),
                if args.len() == 1 { "was" } else { "were" },
            ))
            .into());
        }

        let mut bound: Vec<Option<RuntimeValue>> = args.into_iter().map(Some).collect();
        bound.resize(params.len(), None);
        for (name, value) in keywords {
            let Some(index) = params.iter().position(|p| p.name == name) else {
                return Err(RuntimeError::TypeError(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    def.name, name
                ))
                .into());
            };
            if bound[index].is_some() {
                return Err(RuntimeError::TypeError(format!(
                    "{}() got multiple values for argument '{}'",
                    def.name, name
                ))
                .into());
            }
            bound[index] = Some(value);
        }

        let locals = Namespace::new();
        let mut missing = Vec::new();
        for ((param, value), default) in params.iter().zip(bound).zip(&function.defaults) {
            match value.or_else(|| default.clone()) {
                Some(value) => locals.set(param.name.clone(), value),
                None => missing.push(format!("'{}'", param.name)),
            }
        }
        if !missing.is_empty() {
            return Err(RuntimeError::TypeError(format!(
                "{}() missing {} required positional argument{}: {}",
                def.name,
                missing.len(),
                if missing.len() == 1 { "" } else { "s" },
                missing.join(" and ")
            ))
            .into());
        }

        let scope = Scope {
            locals,
            enclosing: function.enclosing.clone(),
            globals: function.globals.clone(),
        };
        self.frames.push(ActiveFrame {
            code: function.code.clone(),
            name: def.name.clone(),
            line: def.body.first().map_or(1, |s| s.line),
        });
        let result = self.exec_block(&def.body, &scope);
        self.frames.pop();
        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(RuntimeValue::None),
        }
    }

    /// Resolve a module by name: builtin modules, then the cache, then
    /// `<name>.py` on the search path.
    fn import(&mut self, name: &str) -> Result<RuntimeValue, DiagnosticError> {
        if let Some(module) = modules::builtin_module(name) {
            return Ok(module);
        }
        if let Some(module) = self.modules.get(name) {
            return Ok(module.clone());
        }

        let relative = PathBuf::from(format!("{}.py", name.replace('.', "/")));
        let Some(path) = self
            .search_paths
            .iter()
            .map(|dir| dir.join(&relative))
            .find(|candidate| candidate.is_file())
        else {
            return Err(RuntimeError::ModuleNotFound(name.to_string()).into());
        };
        log::debug!("importing module '{}' from {}", name, path.display());

        let source = std::fs::read_to_string(&path)
            .map_err(|e| RuntimeError::IoError(format!("cannot read '{}': {}", path.display(), e)))?;
        let code = Code::compile(&source, path.clone(), &PlainAsserts).map_err(|e| {
            RuntimeError::Syntax {
                message: e.message,
                path: path.display().to_string(),
                line: e.line,
            }
        })?;

        let namespace = Namespace::new();
        namespace.set("__name__", RuntimeValue::str(name));
        let module = RuntimeValue::Module(Rc::new(Module {
            name: name.to_string(),
            namespace: namespace.clone(),
        }));
        // Cache before executing so circular imports see the partial module.
        self.modules.insert(name.to_string(), module.clone());
        if let Err(err) = self.exec(Rc::new(code), &namespace) {
            self.modules.remove(name);
            return Err(err);
        }
        Ok(module)
    }

    fn set_line(&mut self, line: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.line = line;
        }
    }

    fn current_code(&self) -> Result<Rc<Code>, RuntimeError> {
        self.frames
            .last()
            .map(|f| f.code.clone())
            .ok_or_else(|| RuntimeError::Custom("no active frame".into()))
    }

    fn snapshot(&self) -> Vec<Frame> {
        self.frames
            .iter()
            .map(|f| Frame {
                path: f.code.path.clone(),
                line: f.line,
                name: f.name.clone(),
                source_line: f.code.line_text(f.line),
            })
            .collect()
    }
}

fn syntax_error(code: &Code, message: &str) -> DiagnosticError {
    RuntimeError::Syntax {
        message: message.to_string(),
        path: code.path.display().to_string(),
        line: 1,
    }
    .into()
}
