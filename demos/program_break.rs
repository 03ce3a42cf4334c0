use std::{
  io::{IsTerminal, Read},
  ptr::{self, NonNull},
};

use segalloc::{Config, ProgramBreak, SegAllocator, logging};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
/// Skipped when stdin is not a terminal.
fn block_until_enter_pressed() {
  if !std::io::stdin().is_terminal() {
    return;
  }
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    ProgramBreak::current(),
  );
}

fn print_alloc(
  size: usize,
  addr: Option<NonNull<u8>>,
) {
  match addr {
    Some(addr) => println!(
      "Allocated {} bytes, address = {:?}, program break = {:?}",
      size,
      addr,
      ProgramBreak::current()
    ),
    None => println!("Allocation of {} bytes failed (break moved by someone else?)", size),
  }
}

fn main() {
  logging::init();

  print_program_break("start");

  // The allocator grows the real program break. Anything else in the process
  // that moves it (the system malloc included) makes the next growth fail.
  let source = ProgramBreak::new().expect("cannot align the program break");
  let mut allocator = SegAllocator::with_config(source, Config::from_env()).expect("allocator init failed");

  print_program_break("after init");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Allocate a u32. The block is 16 bytes: header, payload, footer.
  // --------------------------------------------------------------------
  let first_block = allocator.allocate(4);
  println!("\n[1] Allocate 4 bytes");
  print_alloc(4, first_block);

  if let Some(first) = first_block {
    let first_ptr = first.as_ptr().cast::<u32>();
    unsafe { first_ptr.write(0xDEADBEEF) };
    println!("[1] Value written to first_block = 0x{:X}", unsafe { first_ptr.read() });
  }

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Allocate 100 bytes. Large enough to be carved from the top of the
  //    free block under the default placement.
  // --------------------------------------------------------------------
  let second_block = allocator.allocate(100);
  println!("\n[2] Allocate 100 bytes");
  print_alloc(100, second_block);

  if let Some(second) = second_block {
    unsafe { ptr::write_bytes(second.as_ptr(), 0xAB, 100) };
    println!("[2] Initialized second block with 0xAB");
    println!(
      "[2] Address = {:#X}, addr % 8 = {}",
      second.as_ptr() as usize,
      second.as_ptr() as usize % 8
    );
  }

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Release the first block and ask for a same-class block again.
  // --------------------------------------------------------------------
  if let Some(first) = first_block {
    unsafe { allocator.release(first) };
    println!("\n[3] Released first_block at {:?}", first);
  }

  let third_block = allocator.allocate(2);
  println!("\n[3] Allocate 2 bytes (check reuse of freed block)");
  print_alloc(2, third_block);
  println!(
    "[3] third_block == first_block? {}",
    if third_block == first_block {
      "Yes, it reused the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Grow the second block past the initial chunk. It sits at the end of
  //    the heap, so it grows in place by extending the break.
  // --------------------------------------------------------------------
  print_program_break("before resize");

  if let Some(second) = second_block {
    let grown = unsafe { allocator.resize(Some(second), 64 * 1024) };
    println!("\n[4] Resize second block to 64 KiB");
    print_alloc(64 * 1024, grown);

    if let Some(grown) = grown {
      println!("[4] Moved? {}", grown != second);
      println!("[4] First byte still 0x{:X}", unsafe { grown.as_ptr().read() });
    }
  }

  print_program_break("after resize");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) End of demo. The break never moves back; the OS reclaims the memory
  //    when the process exits.
  // --------------------------------------------------------------------
  println!("\n[5] Heap check: {:?}", allocator.check());
  println!("[5] Stats: {:?}", allocator.stats());
}
