#![no_main]
use arbitrary::Arbitrary;
use ezmount::MenuAction;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct MenuInput {
    choice: String,
    count: u8,
}

fuzz_target!(|input: MenuInput| {
    let count = usize::from(input.count);
    match MenuAction::parse(&input.choice, count) {
        Ok(MenuAction::Mount(index)) | Ok(MenuAction::Unmount(index)) => assert!(index < count),
        _ => {}
    }
});
