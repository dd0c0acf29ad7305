pub trait NamedProvider {
    fn name(&self) -> &str;
}

/// Name-keyed set of boxed providers, e.g. `ProviderRegistry<dyn TextProvider>`.
pub struct ProviderRegistry<T: ?Sized + NamedProvider> {
    providers: Vec<Box<T>>,
}

impl<T: ?Sized + NamedProvider> Default for ProviderRegistry<T> {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
        }
    }
}

impl<T: ?Sized + NamedProvider> ProviderRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `provider`, replacing any provider registered under the same name.
    pub fn register(&mut self, provider: Box<T>) {
        self.providers
            .retain(|existing| existing.name() != provider.name());
        self.providers.push(provider);
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.providers
            .iter()
            .find(|provider| provider.name() == name)
            .map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self
            .providers
            .iter()
            .map(|provider| provider.name().to_string())
            .collect::<Vec<String>>();
        names.sort();
        names
    }
}
