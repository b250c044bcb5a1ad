use shrd::{Shared, SyncShared};

const N: usize = 4;

fn main() {
    env_logger::init();

    let config: SyncShared<Vec<String>> = Shared::new(vec![String::from("a"), String::from("b")]);

    std::thread::scope(|s| {
        for i in 0..N {
            let config = config.clone();
            s.spawn(move || {
                println!("thread {i} sees {} entries", config.len());
            });
        }
    });

    println!("back to {} handle", config.use_count());
}
