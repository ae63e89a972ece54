/// An offset-based page. Page numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub size: usize,
}

impl Page {
    /// Creates a page, treating page 0 as the first page
    pub fn new(number: usize, size: usize) -> Self {
        Self {
            number: number.max(1),
            size: size.max(1),
        }
    }

    /// How many items come before this page
    pub fn offset(&self) -> usize {
        (self.number - 1) * self.size
    }

    /// Returns the slice of `items` covered by this page
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.offset()).take(self.size).collect()
    }
}

#[cfg(test)]
mod test {
    use super::Page;

    #[test]
    fn pages_are_contiguous() {
        let items: Vec<_> = (0..45).collect();

        let first = Page::new(1, 20).slice(items.clone());
        let second = Page::new(2, 20).slice(items.clone());
        let third = Page::new(3, 20).slice(items.clone());

        assert_eq!(first, (0..20).collect::<Vec<_>>());
        assert_eq!(second, (20..40).collect::<Vec<_>>());
        assert_eq!(third, (40..45).collect::<Vec<_>>());
    }

    #[test]
    fn page_zero_is_the_first_page() {
        assert_eq!(Page::new(0, 10).offset(), 0);
    }
}
