#[cfg(not(windows))]
mod fuzz {
    use std::{
        io::{self, Cursor, Seek, SeekFrom, Write},
        sync::atomic::AtomicBool,
    };

    use honggfuzz::fuzz;
    use sdat2img::{
        format::transfer_list::{BLOCK_SIZE, TransferList},
        image,
        stream::{FromReader, SetLen},
    };

    /// Sink that only tracks its size so that huge block numbers don't
    /// allocate anything.
    #[derive(Default)]
    struct SizeSink {
        offset: u64,
        size: u64,
    }

    impl Write for SizeSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.offset += buf.len() as u64;
            self.size = self.size.max(self.offset);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for SizeSink {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.offset = match pos {
                SeekFrom::Start(n) => n,
                SeekFrom::End(n) => self.size.saturating_add_signed(n),
                SeekFrom::Current(n) => self.offset.saturating_add_signed(n),
            };
            Ok(self.offset)
        }
    }

    impl SetLen for SizeSink {
        fn set_len(&mut self, size: u64) -> io::Result<()> {
            self.size = size;
            Ok(())
        }
    }

    pub fn main() {
        let cancel_signal = AtomicBool::new(false);
        let source = vec![0u8; 16 * BLOCK_SIZE as usize];

        loop {
            fuzz!(|data: &[u8]| {
                if let Ok(transfer_list) = TransferList::from_reader(Cursor::new(data)) {
                    let _ = image::reconstruct_image(
                        transfer_list,
                        Cursor::new(&source),
                        SizeSink::default(),
                        &cancel_signal,
                    );
                }
            });
        }
    }
}

fn main() {
    #[cfg(not(windows))]
    fuzz::main();
}
