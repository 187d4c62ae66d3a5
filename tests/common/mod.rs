// Shared fixtures for anacore integration tests
#![allow(dead_code)]

use anacore::{
    Analysis, AnalysisContext, AnalysisDescriptor, AnalysisError, AnalysisRegistry, Arguments,
    Fault, Runnable, Session,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A toy binary: a list of basic blocks, some of which cannot be decoded.
#[derive(Debug, Clone)]
pub struct Program {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub addr: u64,
    pub size: u64,
    pub decodable: bool,
}

impl Program {
    /// Five blocks at 0x1000.., the ones at 0x1010 and 0x1030 are corrupt.
    pub fn sample() -> Self {
        let blocks = (0..5u64)
            .map(|i| Block {
                addr: 0x1000 + i * 0x10,
                size: 0x10,
                decodable: i % 2 == 0,
            })
            .collect();
        Self { blocks }
    }
}

/// Lifts every block, recording a fault for each one that does not decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lifted {
    pub addrs: Vec<u64>,
}

impl Analysis for Lifted {
    fn prepare(_ctx: &AnalysisContext<'_>) -> Result<Self, AnalysisError> {
        Ok(Self { addrs: Vec::new() })
    }

    fn run(&mut self, ctx: &mut AnalysisContext<'_>) -> Result<(), AnalysisError> {
        let program = ctx
            .project::<Program>()
            .ok_or_else(|| Fault::lookup("no program loaded"))?;

        for block in &program.blocks {
            let addr = ctx
                .resilience()
                .named(format!("{:#x}", block.addr))
                .run(|_ctx| {
                    if !block.decodable {
                        return Err(Fault::value(format!("undecodable block at {:#x}", block.addr)).into());
                    }
                    Ok(block.addr)
                })?;
            if let Some(addr) = addr {
                self.addrs.push(addr);
            }
        }
        Ok(())
    }
}

/// Registry with `Size` (function), `Lifted` (constructor) and `Summary`
/// (function depending on both). `calls` counts every body execution.
pub fn program_registry(calls: &Arc<AtomicUsize>) -> Arc<AnalysisRegistry> {
    let registry = Arc::new(AnalysisRegistry::new());

    let counter = Arc::clone(calls);
    registry.register(
        "Size",
        Runnable::function(move |ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            let program = ctx
                .project::<Program>()
                .ok_or_else(|| Fault::lookup("no program loaded"))?;
            Ok(program.blocks.iter().map(|b| b.size).sum::<u64>())
        }),
        vec![],
        true,
    );

    registry.insert(AnalysisDescriptor::new("Lifted", Runnable::constructor::<Lifted>()));

    let counter = Arc::clone(calls);
    registry.insert(
        AnalysisDescriptor::new(
            "Summary",
            Runnable::function(move |ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                let size = ctx.dependency::<u64>(0)?;
                let lifted = ctx.dependency::<Lifted>(1)?;
                Ok(format!("{} bytes, {} blocks lifted", size, lifted.addrs.len()))
            }),
        )
        .depends_on("Size")
        .depends_on("Lifted"),
    );

    registry
}

pub fn program_session(calls: &Arc<AtomicUsize>) -> Session {
    Session::with_registry(Program::sample(), program_registry(calls))
}

pub fn no_args() -> Arguments {
    Arguments::new()
}
