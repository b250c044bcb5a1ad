use shrd::{LocalShared, Shared};

#[derive(Debug)]
struct Resource(&'static str);

impl Drop for Resource {
    fn drop(&mut self) {
        println!("releasing {}", self.0);
    }
}

fn main() {
    env_logger::init();

    let first: LocalShared<_> = Shared::new(Resource("first"));
    println!("use_count = {}", first.use_count());

    {
        let second = first.clone();
        println!("{second:?} shared by {} handles", second.use_count());
    }
    println!("use_count = {}", first.use_count());

    let mut other: LocalShared<_> = Shared::new(Resource("other"));
    other.assign(&first);
    println!("after assignment: use_count = {}", first.use_count());

    let weak = Shared::downgrade(&first);
    drop(first);
    drop(other);
    println!("upgrade after release: {:?}", weak.upgrade());
}
