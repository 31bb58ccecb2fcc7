use std::collections::HashMap;

use mapfile::{MappedFile, Result};

/// Blocks of anonymous memory, each its own mapping, identified by their address.
#[derive(Default)]
struct Pool {
    blocks: HashMap<usize, MappedFile>,
}

impl Pool {
    fn alloc(&mut self, length: usize) -> Result<usize> {
        let mut block = MappedFile::new();
        block.anon_map(length)?;

        let addr = block.as_ptr() as usize;
        self.blocks.insert(addr, block);
        Ok(addr)
    }

    /// Resize a block, returning its possibly moved address.
    ///
    /// A block that fails to resize is gone afterwards.
    fn realloc(&mut self, addr: usize, length: usize) -> Result<usize> {
        let mut block = self.blocks.remove(&addr).ok_or(mapfile::Error::InvalidArgs)?;
        block.resize(length)?;

        let addr = block.as_ptr() as usize;
        if block.is_mapped() {
            self.blocks.insert(addr, block);
        }

        Ok(addr)
    }

    fn dealloc(&mut self, addr: usize) {
        self.blocks.remove(&addr);
    }

    fn get_mut(&mut self, addr: usize) -> Option<&mut [u8]> {
        self.blocks.get_mut(&addr)?.as_mut_slice()
    }
}

fn main() {
    let mut pool = Pool::default();

    let small = pool.alloc(10).unwrap();
    pool.get_mut(small).unwrap().copy_from_slice(b"1234567890");
    println!("alloc 10: {}", String::from_utf8_lossy(pool.get_mut(small).unwrap()));

    // Shrinking needs `mremap`, elsewhere the block is released instead.
    match pool.realloc(small, 5) {
        Ok(small) => {
            println!("alloc 5: {}", String::from_utf8_lossy(pool.get_mut(small).unwrap()));
        }
        Err(err) => println!("realloc 5: {err}"),
    }

    // Pages are populated on first touch, but strict overcommit may still refuse it.
    match pool.alloc(64 << 20) {
        Ok(large) => println!("alloc 64M at {large:#x}"),
        Err(err) => println!("alloc 64M: {err}"),
    }
    println!("pool size: {}", pool.blocks.len());

    let addrs: Vec<usize> = pool.blocks.keys().copied().collect();
    for addr in addrs {
        pool.dealloc(addr);
        assert!(pool.get_mut(addr).is_none());
    }

    println!("pool size: {}", pool.blocks.len());
}
