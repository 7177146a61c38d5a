use std::sync::{Arc, Mutex};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rhai::{Dynamic, Engine, ImmutableString, Scope, AST};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EnvError, Result};

// =============================================================================
// Script Engine
// =============================================================================

/// A precompiled expression or statement, bound to the function library that
/// was loaded when it was compiled.
#[derive(Debug, Clone)]
pub struct CompiledScript {
    ast: AST,
    source: String,
    generation: u64,
}

impl CompiledScript {
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Position in a seeded `random()` stream: the seed and how many values have
/// been drawn from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngCursor {
    pub seed: u64,
    pub draws: u64,
}

struct HostRng {
    rng: SmallRng,
    seed: Option<u64>,
    draws: u64,
}

impl HostRng {
    fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => SmallRng::seed_from_u64(s),
            None => SmallRng::from_os_rng(),
        };
        Self { rng, seed, draws: 0 }
    }

    fn next(&mut self) -> f64 {
        self.draws += 1;
        self.rng.random::<f64>()
    }
}

/// Game script host. Every loaded source adds its functions to one shared
/// library and its top-level `let`s to one shared scope, which is the whole
/// mutable heap of the game.
pub struct ScriptEngine {
    engine: Engine,
    scope: Scope<'static>,
    library: AST,
    loaded: Vec<(String, AST)>,
    generation: u64,
    rng: Arc<Mutex<HostRng>>,
}

impl ScriptEngine {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = Arc::new(Mutex::new(HostRng::new(seed)));
        let mut engine = Engine::new();
        engine.set_fast_operators(true);
        register_host_api(&mut engine, rng.clone());
        Self {
            engine,
            scope: Scope::new(),
            library: AST::empty(),
            loaded: Vec::new(),
            generation: 0,
            rng,
        }
    }

    pub fn reseed(&mut self, seed: Option<u64>) {
        if let Ok(mut rng) = self.rng.lock() {
            *rng = HostRng::new(seed);
        }
    }

    /// Where the seeded `random()` stream stands. `None` when unseeded.
    pub fn rng_cursor(&self) -> Option<RngCursor> {
        let rng = self.rng.lock().ok()?;
        rng.seed.map(|seed| RngCursor {
            seed,
            draws: rng.draws,
        })
    }

    /// Rebuild the `random()` stream at `cursor` by replaying its draws.
    pub fn restore_rng(&mut self, cursor: RngCursor) -> Result<()> {
        let mut restored = HostRng::new(Some(cursor.seed));
        for _ in 0..cursor.draws {
            restored.next();
        }
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| EnvError::Snapshot("random stream lock poisoned".into()))?;
        *rng = restored;
        Ok(())
    }

    /// Compile `source`, add its functions to the library and run its top
    /// level against the shared scope. Later sources see everything earlier
    /// ones defined.
    pub fn load(&mut self, name: &str, source: &str) -> Result<()> {
        let ast = self
            .engine
            .compile(source)
            .map_err(|e| EnvError::script(name, e))?;
        self.library.combine(ast.clone_functions_only());
        self.generation += 1;
        self.run_top_level(name, &ast)?;
        self.loaded.push((name.to_string(), ast));
        Ok(())
    }

    /// Drop all script globals and rerun every loaded source in order. The
    /// function library is kept, so compiled scripts stay valid.
    pub fn reload(&mut self) -> Result<()> {
        self.scope.clear();
        let loaded = std::mem::take(&mut self.loaded);
        let result = loaded
            .iter()
            .try_for_each(|(name, ast)| self.run_top_level(name, ast));
        self.loaded = loaded;
        result
    }

    fn run_top_level(&mut self, name: &str, ast: &AST) -> Result<()> {
        let runnable = self.library.merge(ast);
        self.engine
            .run_ast_with_scope(&mut self.scope, &runnable)
            .map_err(|e| EnvError::script(name, e))
    }

    pub fn compile(&self, source: &str) -> Result<CompiledScript> {
        let ast = self
            .engine
            .compile(source)
            .map_err(|e| EnvError::script(source, e))?;
        Ok(CompiledScript {
            ast: self.library.merge(&ast),
            source: source.to_string(),
            generation: self.generation,
        })
    }

    /// Run a compiled script with `bindings` visible as variables. Bindings
    /// and any variable the script declares are gone afterwards.
    pub fn run_compiled(
        &mut self,
        script: &CompiledScript,
        bindings: &[(&str, Dynamic)],
    ) -> Result<Dynamic> {
        if script.generation != self.generation {
            return Err(EnvError::script(
                &script.source,
                "compiled against a different script library",
            ));
        }
        let mark = self.scope.len();
        for (name, value) in bindings {
            self.scope.push_dynamic(*name, value.clone());
        }
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &script.ast);
        self.scope.rewind(mark);
        result.map_err(|e| EnvError::script(&script.source, e))
    }

    pub fn evaluate_expression(&mut self, expr: &str) -> Result<Dynamic> {
        let compiled = self.compile(expr)?;
        self.run_compiled(&compiled, &[])
    }

    /// Execute for side effects. Top-level `let`s persist in the heap.
    pub fn evaluate_statement(&mut self, stmt: &str) -> Result<()> {
        let runnable = self
            .engine
            .compile(stmt)
            .map(|ast| self.library.merge(&ast))
            .map_err(|e| EnvError::script(stmt, e))?;
        self.engine
            .run_ast_with_scope(&mut self.scope, &runnable)
            .map_err(|e| EnvError::script(stmt, e))
    }

    // -------------------------------------------------------------------------
    // Heap snapshots
    // -------------------------------------------------------------------------

    /// Every non-constant global as one JSON object. Keys come out sorted, so
    /// the same heap always produces the same bytes. The `random()` stream is
    /// not part of the heap; see [`ScriptEngine::rng_cursor`].
    pub fn snapshot(&self) -> Result<String> {
        let mut heap = serde_json::Map::new();
        for (name, is_constant, value) in self.scope.iter() {
            if is_constant {
                continue;
            }
            let json: serde_json::Value = rhai::serde::from_dynamic(&value)
                .map_err(|e| EnvError::Snapshot(format!("global `{name}`: {e}")))?;
            heap.insert(name.to_string(), json);
        }
        Ok(serde_json::to_string(&serde_json::Value::Object(heap))?)
    }

    pub fn restore(&mut self, snapshot: &str) -> Result<()> {
        let heap: serde_json::Map<String, serde_json::Value> = serde_json::from_str(snapshot)
            .map_err(|e| EnvError::Snapshot(format!("heap is not a JSON object: {e}")))?;
        for (name, json) in heap {
            let value = rhai::serde::to_dynamic(&json)
                .map_err(|e| EnvError::Snapshot(format!("global `{name}`: {e}")))?;
            match self.scope.is_constant(&name) {
                Some(true) => {}
                Some(false) => {
                    if let Some(slot) = self.scope.get_mut(&name) {
                        *slot = value;
                    }
                }
                None => {
                    self.scope.push_dynamic(name, value);
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("sources", &self.loaded.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("globals", &self.scope.len())
            .field("generation", &self.generation)
            .finish()
    }
}

fn register_host_api(engine: &mut Engine, rng: Arc<Mutex<HostRng>>) {
    engine.register_fn("random", move || -> f64 {
        rng.lock().map(|mut r| r.next()).unwrap_or(0.0)
    });
    engine.register_fn("log", |msg: ImmutableString| {
        debug!(target: "clipsim::script", "{msg}");
    });
}

/// Numeric view of a script value. Booleans read as 0/1 so flags can be
/// observed like any other field.
pub fn dynamic_to_f64(value: &Dynamic) -> Option<f64> {
    if let Ok(f) = value.as_float() {
        Some(f)
    } else if let Ok(i) = value.as_int() {
        Some(i as f64)
    } else if let Ok(b) = value.as_bool() {
        Some(if b { 1.0 } else { 0.0 })
    } else {
        None
    }
}
