//! Solidity compilation through `foundry-compilers`.
//!
//! Each [`ContractSource`] names the exact solc release it builds with.
//! Missing releases are installed with svm on first use and compiled
//! artifacts are cached for the lifetime of the compiler.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use alloy::json_abi::JsonAbi;
use alloy::primitives::{Bytes, Selector};
use foundry_compilers::artifacts::output_selection::OutputSelection;
use foundry_compilers::artifacts::{
    BytecodeObject, EvmVersion, Remapping, Settings, SolcInput, Source,
};
use foundry_compilers::error::{SolcError, SolcIoError};
use foundry_compilers::solc::{Solc, SolcLanguage};
use tracing::{debug, info};

use crate::contracts::ContractSource;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("failed to read contract source: {0}")]
    Io(#[from] SolcIoError),
    #[error("solc invocation failed: {0}")]
    Solc(#[from] SolcError),
    #[error("compilation of {path} failed:\n{diagnostics}")]
    Diagnostics { path: String, diagnostics: String },
    #[error("contract {name} not found in output for {path}")]
    ContractNotFound { path: String, name: String },
    #[error("contract {name} has no {artifact} in compiler output")]
    MissingArtifact {
        name: String,
        artifact: &'static str,
    },
    #[error("bytecode of {name} has unlinked library references")]
    Unlinked { name: String },
    #[error("ABI of {name} has no function with selector {selector}")]
    MissingSelector { name: String, selector: Selector },
    #[error("compiler task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// ABI and creation bytecode of one compiled contract.
#[derive(Debug, Clone)]
pub struct CompiledContract {
    pub name: String,
    pub abi: JsonAbi,
    pub bytecode: BytecodeObject,
}

impl CompiledContract {
    /// Creation bytecode followed by the ABI-encoded constructor
    /// arguments.
    pub fn init_code(&self, constructor_args: &[u8]) -> Result<Bytes, CompileError> {
        let creation = self
            .bytecode
            .as_bytes()
            .ok_or_else(|| CompileError::Unlinked {
                name: self.name.clone(),
            })?;

        let mut code = Vec::with_capacity(creation.len() + constructor_args.len());
        code.extend_from_slice(creation);
        code.extend_from_slice(constructor_args);

        Ok(code.into())
    }

    /// Checks that every selector the bindings call exists in the
    /// compiled ABI.
    pub fn ensure_selectors(&self, selectors: &[Selector]) -> Result<(), CompileError> {
        for selector in selectors {
            let found = self
                .abi
                .functions()
                .any(|function| function.selector() == *selector);

            if !found {
                return Err(CompileError::MissingSelector {
                    name: self.name.clone(),
                    selector: *selector,
                });
            }
        }

        Ok(())
    }
}

/// Import remappings of the CCTP contracts repository.
pub fn default_remappings() -> Vec<Remapping> {
    [
        ("@memview-sol/", "lib/memview-sol/"),
        ("@openzeppelin/", "lib/openzeppelin-contracts/"),
        ("ds-test/", "lib/ds-test/src/"),
        ("forge-std/", "lib/forge-std/src/"),
    ]
    .into_iter()
    .map(|(name, path)| Remapping {
        context: None,
        name: name.to_owned(),
        path: path.to_owned(),
    })
    .collect()
}

/// Compiles contracts found under `root`, caching artifacts per source.
#[derive(Debug, Clone)]
pub struct SolcCompiler {
    root: PathBuf,
    remappings: Vec<Remapping>,
    cache: Arc<RwLock<BTreeMap<ContractSource, Arc<CompiledContract>>>>,
}

impl SolcCompiler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_remappings(root, default_remappings())
    }

    pub fn with_remappings(root: impl Into<PathBuf>, remappings: Vec<Remapping>) -> Self {
        Self {
            root: root.into(),
            remappings,
            cache: Arc::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compiles `source` on a blocking thread, or returns the cached
    /// artifact.
    pub async fn compile(
        &self,
        source: &ContractSource,
    ) -> Result<Arc<CompiledContract>, CompileError> {
        if let Some(compiled) = self.cached(source) {
            debug!(name = source.name, "Using cached compiler output");
            return Ok(compiled);
        }

        let compiler = self.clone();
        let owned = source.clone();
        let compiled =
            tokio::task::spawn_blocking(move || compiler.compile_blocking(&owned)).await??;
        let compiled = Arc::new(compiled);

        match self.cache.write() {
            Ok(mut guard) => guard.insert(source.clone(), Arc::clone(&compiled)),
            Err(poison) => poison
                .into_inner()
                .insert(source.clone(), Arc::clone(&compiled)),
        };

        Ok(compiled)
    }

    fn cached(&self, source: &ContractSource) -> Option<Arc<CompiledContract>> {
        let guard = match self.cache.read() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        };
        guard.get(source).cloned()
    }

    fn compile_blocking(&self, source: &ContractSource) -> Result<CompiledContract, CompileError> {
        let version = &source.solc_version;
        let sources = Source::read_all([self.root.join(source.path)])?;

        let input = SolcInput {
            language: SolcLanguage::Solidity,
            sources,
            settings: Settings {
                remappings: self.remappings.clone(),
                output_selection: OutputSelection::complete_output_selection(),
                evm_version: EvmVersion::default().normalize_version_solc(version),
                ..Default::default()
            },
        };

        let mut solc = Solc::find_or_install(version)?;
        solc.allow_paths.insert(self.root.clone());
        solc.base_path = Some(self.root.clone());

        info!(path = source.path, %version, "Compiling contract");
        let output = solc.compile_exact(&input)?;

        let diagnostics = output
            .errors
            .iter()
            .filter(|error| error.severity.is_error())
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        if !diagnostics.is_empty() {
            return Err(CompileError::Diagnostics {
                path: source.path.to_owned(),
                diagnostics: diagnostics.join("\n"),
            });
        }

        let contract = output
            .contracts
            .iter()
            .filter(|(file, _)| Path::new(file).ends_with(source.path))
            .find_map(|(_, contracts)| contracts.get(source.name))
            .ok_or_else(|| CompileError::ContractNotFound {
                path: source.path.to_owned(),
                name: source.name.to_owned(),
            })?;

        let missing = |artifact| CompileError::MissingArtifact {
            name: source.name.to_owned(),
            artifact,
        };

        let abi = contract.abi.clone().ok_or_else(|| missing("abi"))?;
        let bytecode = contract
            .evm
            .as_ref()
            .and_then(|evm| evm.bytecode.as_ref())
            .map(|bytecode| bytecode.object.clone())
            .ok_or_else(|| missing("bytecode"))?;

        Ok(CompiledContract {
            name: source.name.to_owned(),
            abi,
            bytecode,
        })
    }
}
